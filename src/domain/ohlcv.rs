//! OHLCV bar representation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::error::CrosswatchError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// (open + close) / 2, the current-value estimate used for snapshots.
    pub fn mid_price(&self) -> f64 {
        (self.open + self.close) / 2.0
    }

    /// close - open
    pub fn body(&self) -> f64 {
        self.close - self.open
    }
}

/// Reject series whose timestamps are not strictly increasing.
pub fn validate_bars(instrument: &str, bars: &[Bar]) -> Result<(), CrosswatchError> {
    for pair in bars.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(CrosswatchError::DataSource {
                reason: format!(
                    "{}: bar at {} does not follow {}",
                    instrument, pair[1].timestamp, pair[0].timestamp
                ),
            });
        }
    }
    Ok(())
}

/// Index of the last bar with `timestamp <= at`, if any.
pub fn last_index_at_or_before(bars: &[Bar], at: NaiveDateTime) -> Option<usize> {
    let count = bars.partition_point(|b| b.timestamp <= at);
    count.checked_sub(1)
}
