//! Domain error types.
//!
//! Data-availability errors (`NoData`, `InsufficientWarmup`, `StaleData`,
//! `CalendarUnavailable`) are recovered by abstaining for one tick.
//! Configuration errors are fatal.

/// Top-level error type for crosswatch.
#[derive(Debug, thiserror::Error)]
pub enum CrosswatchError {
    #[error("no data for {instrument}")]
    NoData { instrument: String },

    #[error("insufficient data for {indicator}: have {bars} values, need more than {required}")]
    InsufficientWarmup {
        indicator: String,
        bars: usize,
        required: usize,
    },

    #[error("stale data for {instrument}: latest bar is {age_secs}s old, threshold {threshold_secs}s")]
    StaleData {
        instrument: String,
        age_secs: i64,
        threshold_secs: i64,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("no business calendar for exchange {exchange}")]
    CalendarUnavailable { exchange: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("export error: {reason}")]
    Export { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CrosswatchError {
    /// True for errors handled by abstaining for the current tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CrosswatchError::NoData { .. }
                | CrosswatchError::InsufficientWarmup { .. }
                | CrosswatchError::StaleData { .. }
                | CrosswatchError::CalendarUnavailable { .. }
        )
    }
}

impl From<&CrosswatchError> for std::process::ExitCode {
    fn from(err: &CrosswatchError) -> Self {
        let code: u8 = match err {
            CrosswatchError::Io(_) | CrosswatchError::Export { .. } => 1,
            CrosswatchError::ConfigParse { .. }
            | CrosswatchError::ConfigMissing { .. }
            | CrosswatchError::ConfigInvalid { .. }
            | CrosswatchError::InvalidConfiguration { .. } => 2,
            CrosswatchError::DataSource { .. } => 3,
            CrosswatchError::NoData { .. }
            | CrosswatchError::InsufficientWarmup { .. }
            | CrosswatchError::StaleData { .. }
            | CrosswatchError::CalendarUnavailable { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_availability_errors_are_recoverable() {
        assert!(CrosswatchError::NoData {
            instrument: "AAPL".into()
        }
        .is_recoverable());
        assert!(CrosswatchError::StaleData {
            instrument: "AAPL".into(),
            age_secs: 7200,
            threshold_secs: 3600,
        }
        .is_recoverable());
        assert!(CrosswatchError::CalendarUnavailable {
            exchange: "MOON".into()
        }
        .is_recoverable());
    }

    #[test]
    fn configuration_errors_are_fatal() {
        let err = CrosswatchError::InvalidConfiguration {
            reason: "unknown exit strategy 'yolo'".into(),
        };
        assert!(!err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "invalid configuration: unknown exit strategy 'yolo'"
        );
    }

    #[test]
    fn insufficient_warmup_message() {
        let err = CrosswatchError::InsufficientWarmup {
            indicator: "EMA(20)".into(),
            bars: 12,
            required: 20,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for EMA(20): have 12 values, need more than 20"
        );
    }
}
