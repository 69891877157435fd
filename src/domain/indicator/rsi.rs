//! RSI (Relative Strength Index) indicator.
//!
//! Per-bar gain/loss come from the candle body (close - open), not from the
//! change between consecutive closes. Averages are plain means over the
//! `period` bars preceding bar i (no Wilder smoothing):
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)), and 100 when avg_loss == 0.
//!
//! Warmup: first `period` bars are invalid.

use crate::domain::error::CrosswatchError;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_PERIOD: usize = 14;

pub fn calculate_rsi(bars: &[Bar], period: usize) -> Result<IndicatorSeries, CrosswatchError> {
    if period == 0 {
        return Err(CrosswatchError::InvalidConfiguration {
            reason: "RSI period must be positive".into(),
        });
    }
    if bars.len() <= period {
        return Err(CrosswatchError::InsufficientWarmup {
            indicator: IndicatorType::Rsi(period).to_string(),
            bars: bars.len(),
            required: period,
        });
    }

    let gains: Vec<f64> = bars.iter().map(|b| b.body().max(0.0)).collect();
    let losses: Vec<f64> = bars.iter().map(|b| b.body().min(0.0)).collect();

    let mut values = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        if i < period {
            values.push(IndicatorPoint {
                timestamp: bar.timestamp,
                valid: false,
                value: IndicatorValue::Simple(0.0),
            });
            continue;
        }

        let avg_gain = gains[i - period..i].iter().sum::<f64>() / period as f64;
        let avg_loss = -losses[i - period..i].iter().sum::<f64>() / period as f64;
        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };

        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid: true,
            value: IndicatorValue::Simple(rsi),
        });
    }

    Ok(IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    })
}
