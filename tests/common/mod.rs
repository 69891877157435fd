#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use crosswatch::domain::error::CrosswatchError;
pub use crosswatch::domain::ohlcv::Bar;
use crosswatch::domain::settings::TradeLogicParams;
use crosswatch::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, instrument: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(instrument.to_string(), bars);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        _interval: &str,
    ) -> Result<Vec<Bar>, CrosswatchError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(CrosswatchError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(instrument)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && b.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Monday 2024-03-04 09:30.
pub fn session_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

pub fn make_bar(timestamp: NaiveDateTime, close: f64) -> Bar {
    Bar {
        timestamp,
        open: close,
        high: close + 0.1,
        low: close - 0.1,
        close,
        volume: 1000.0,
    }
}

/// One bar every 30 minutes from `session_start()`.
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(session_start() + Duration::minutes(30 * i as i64), close))
        .collect()
}

/// Trade logic with tiny EMAs and every entry filter wide open.
pub fn permissive_params() -> TradeLogicParams {
    TradeLogicParams {
        small_ema_period: 1,
        big_ema_period: 3,
        advanced_ema_period: 3,
        number_of_big_emas_threshold: 0,
        big_ema_derivative_threshold: 1e9,
        ema_surface_plus_threshold: 1e9,
        ema_surface_min_threshold: -1e9,
        number_of_ema_crossings: 0,
        drop_threshold: -1e9,
        ..TradeLogicParams::default()
    }
}
