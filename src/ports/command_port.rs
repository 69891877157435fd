//! External override channel.

use crate::domain::error::CrosswatchError;
use crate::domain::live::Command;

pub trait CommandPort {
    /// Commands received since the last poll. Each command is returned once.
    fn poll(&self) -> Result<Vec<Command>, CrosswatchError>;
}
