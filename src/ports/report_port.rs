//! Output ports: replay reports, the closed-trade stream and state snapshots.

use crate::domain::error::CrosswatchError;
use crate::domain::live::InstrumentSnapshot;
use crate::domain::position::TradeRecord;
use crate::domain::replay::ReplayRow;

/// Port for writing replay results.
pub trait ReportPort {
    fn write_replay(&self, rows: &[ReplayRow]) -> Result<(), CrosswatchError>;
}

/// Receives every closed position, in the order positions close.
pub trait TradeSink {
    fn push(&self, record: &TradeRecord) -> Result<(), CrosswatchError>;
}

/// Receives the per-instrument state after every live cycle.
pub trait SnapshotPort {
    fn write_snapshot(&self, snapshot: &[InstrumentSnapshot]) -> Result<(), CrosswatchError>;
}
