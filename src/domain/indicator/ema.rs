//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1). Leading undefined inputs are skipped; the seed is the SMA of
//! the first n defined values and acts as the EMA of the bar before the first
//! output, so the first defined output is X[i]*k + SMA*(1-k).
//! Undefined inputs after the seed leave the running average untouched and
//! produce an undefined output.

use crate::domain::error::CrosswatchError;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub fn calculate_ema(bars: &[Bar], period: usize) -> Result<IndicatorSeries, CrosswatchError> {
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    let raw = ema_over(&closes, period)?;

    let values = bars
        .iter()
        .zip(raw)
        .map(|(bar, v)| IndicatorPoint {
            timestamp: bar.timestamp,
            valid: v.is_some(),
            value: IndicatorValue::Simple(v.unwrap_or(0.0)),
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values,
    })
}

/// EMA over a series with possibly-undefined samples. Output is aligned 1:1.
pub fn ema_over(input: &[Option<f64>], period: usize) -> Result<Vec<Option<f64>>, CrosswatchError> {
    if period == 0 {
        return Err(CrosswatchError::InvalidConfiguration {
            reason: "EMA period must be positive".into(),
        });
    }

    let defined = input.iter().filter(|v| v.is_some()).count();
    if input.len() <= period || defined <= period {
        return Err(CrosswatchError::InsufficientWarmup {
            indicator: IndicatorType::Ema(period).to_string(),
            bars: defined.min(input.len()),
            required: period,
        });
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(input.len());
    let mut seed_sum = 0.0;
    let mut seed_count = 0;
    let mut ema: Option<f64> = None;

    for value in input {
        match (value, ema) {
            (None, _) => out.push(None),
            (Some(x), None) if seed_count < period => {
                seed_sum += x;
                seed_count += 1;
                if seed_count == period {
                    ema = Some(seed_sum / period as f64);
                }
                out.push(None);
            }
            (Some(x), Some(prev)) => {
                let next = x * k + prev * (1.0 - k);
                ema = Some(next);
                out.push(Some(next));
            }
            (Some(_), None) => out.push(None),
        }
    }

    Ok(out)
}
