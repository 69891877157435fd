//! Bar source port trait.

use crate::domain::error::CrosswatchError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDateTime;

pub trait DataPort: Send + Sync {
    /// Bars of `instrument` with `start <= timestamp <= end`, oldest first.
    /// An empty result means no data for this window, not an error.
    fn fetch_bars(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        interval: &str,
    ) -> Result<Vec<Bar>, CrosswatchError>;
}
