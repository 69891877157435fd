//! Indicator frame: every indicator the decision logic needs, aligned with a
//! bar window, plus the per-entry indicator snapshot.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::crossover::{CrossoverEvent, detect_crossovers};
use crate::domain::error::CrosswatchError;
use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::macd::{DEFAULT_FAST, DEFAULT_SIGNAL, DEFAULT_SLOW, calculate_macd};
use crate::domain::indicator::rsi::{DEFAULT_PERIOD, calculate_rsi};
use crate::domain::indicator::sar::calculate_sar;
use crate::domain::indicator::stochastic::{DEFAULT_SMOOTHING, DEFAULT_WINDOW, calculate_stochastic};
use crate::domain::indicator::{IndicatorSeries, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub const SMALL_BIG_PAIR: &str = "small_ema/big_ema";
pub const CLOSE_BIG_PAIR: &str = "close/big_ema";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpec {
    pub small_ema: usize,
    pub big_ema: usize,
    pub advanced_ema: usize,
    /// Also compute SAR, stochastic, MACD and RSI.
    pub oscillators: bool,
}

#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    pub timestamps: Vec<NaiveDateTime>,
    pub close: Vec<f64>,
    pub small_ema: Vec<Option<f64>>,
    pub big_ema: Vec<Option<f64>>,
    pub advanced_ema: Vec<Option<f64>>,
    pub sar: Option<IndicatorSeries>,
    pub stochastic: Option<IndicatorSeries>,
    pub macd: Option<IndicatorSeries>,
    pub rsi: Option<IndicatorSeries>,
}

/// Indicator values at the bar a position was opened on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub small_ema: Option<f64>,
    pub big_ema: Option<f64>,
    pub advanced_ema: Option<f64>,
    pub sar: Option<f64>,
    pub slow_k: Option<f64>,
    pub fast_k: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub rsi: Option<f64>,
}

/// The three EMAs are required; the oscillators are dropped (left `None`)
/// when the window is too short for them.
pub fn compute_frame(bars: &[Bar], spec: &FrameSpec) -> Result<IndicatorFrame, CrosswatchError> {
    let small_ema = calculate_ema(bars, spec.small_ema)?.simple_values();
    let big_ema = calculate_ema(bars, spec.big_ema)?.simple_values();
    let advanced_ema = calculate_ema(bars, spec.advanced_ema)?.simple_values();

    let (sar, stochastic, macd, rsi) = if spec.oscillators {
        (
            Some(calculate_sar(bars)),
            optional(calculate_stochastic(bars, DEFAULT_WINDOW, DEFAULT_SMOOTHING))?,
            optional(calculate_macd(bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL))?,
            optional(calculate_rsi(bars, DEFAULT_PERIOD))?,
        )
    } else {
        (None, None, None, None)
    };

    Ok(IndicatorFrame {
        timestamps: bars.iter().map(|b| b.timestamp).collect(),
        close: bars.iter().map(|b| b.close).collect(),
        small_ema,
        big_ema,
        advanced_ema,
        sar,
        stochastic,
        macd,
        rsi,
    })
}

fn optional(
    result: Result<IndicatorSeries, CrosswatchError>,
) -> Result<Option<IndicatorSeries>, CrosswatchError> {
    match result {
        Ok(series) => Ok(Some(series)),
        Err(CrosswatchError::InsufficientWarmup { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

impl IndicatorFrame {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// smallEMA < bigEMA at `index`; `None` while either is undefined.
    pub fn is_undervalued(&self, index: usize) -> Option<bool> {
        let small = (*self.small_ema.get(index)?)?;
        let big = (*self.big_ema.get(index)?)?;
        Some(small < big)
    }

    pub fn small_big_crossovers(&self) -> Vec<CrossoverEvent> {
        detect_crossovers(SMALL_BIG_PAIR, &self.timestamps, &self.small_ema, &self.big_ema)
    }

    pub fn close_big_crossovers(&self) -> Vec<CrossoverEvent> {
        let close: Vec<Option<f64>> = self.close.iter().map(|&c| Some(c)).collect();
        detect_crossovers(CLOSE_BIG_PAIR, &self.timestamps, &close, &self.big_ema)
    }

    pub fn snapshot_at(&self, index: usize) -> IndicatorSnapshot {
        let mut snap = IndicatorSnapshot {
            small_ema: self.small_ema.get(index).copied().flatten(),
            big_ema: self.big_ema.get(index).copied().flatten(),
            advanced_ema: self.advanced_ema.get(index).copied().flatten(),
            ..IndicatorSnapshot::default()
        };

        if let Some(point) = self.sar.as_ref().and_then(|s| s.values.get(index)) {
            if let IndicatorValue::Sar { sar, .. } = point.value {
                snap.sar = Some(sar);
            }
        }
        if let Some(point) = self.stochastic.as_ref().and_then(|s| s.values.get(index)) {
            if let IndicatorValue::Stochastic { slow_k, fast_k } = point.value {
                snap.slow_k = point.valid.then_some(slow_k);
                snap.fast_k = fast_k;
            }
        }
        if let Some(point) = self.macd.as_ref().and_then(|s| s.values.get(index)) {
            if let IndicatorValue::Macd { line, signal, .. } = point.value {
                snap.macd_line = point.valid.then_some(line);
                snap.macd_signal = signal;
            }
        }
        snap.rsi = self.rsi.as_ref().and_then(|s| s.simple_at(index));
        snap
    }
}
