//! Stochastic oscillator.
//!
//! slow%K at bar j (j >= N-1) = 100 * (C[j] - LN) / (HN - LN), where LN/HN are
//! the lowest low / highest high of the N bars ending at j. fast%K is the EMA
//! of slow%K. A flat window (HN == LN) leaves that slow%K sample undefined.

use crate::domain::error::CrosswatchError;
use crate::domain::indicator::ema::ema_over;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_WINDOW: usize = 140;
pub const DEFAULT_SMOOTHING: usize = 30;

pub fn calculate_stochastic(
    bars: &[Bar],
    window: usize,
    smoothing: usize,
) -> Result<IndicatorSeries, CrosswatchError> {
    let indicator_type = IndicatorType::Stochastic { window, smoothing };
    if window == 0 || smoothing == 0 {
        return Err(CrosswatchError::InvalidConfiguration {
            reason: format!("{} needs positive window and smoothing", indicator_type),
        });
    }
    if bars.len() < window {
        return Err(CrosswatchError::InsufficientWarmup {
            indicator: indicator_type.to_string(),
            bars: bars.len(),
            required: window,
        });
    }

    let mut slow: Vec<Option<f64>> = vec![None; window - 1];
    for end in window..=bars.len() {
        let span = &bars[end - window..end];
        let lowest = span.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let highest = span.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let close = bars[end - 1].close;

        let range = highest - lowest;
        if range > 0.0 {
            slow.push(Some(100.0 * (close - lowest) / range));
        } else {
            slow.push(None);
        }
    }

    let fast = match ema_over(&slow, smoothing) {
        Ok(values) => values,
        Err(CrosswatchError::InsufficientWarmup { .. }) => vec![None; slow.len()],
        Err(e) => return Err(e),
    };

    let values = bars
        .iter()
        .zip(slow.iter().zip(fast))
        .map(|(bar, (slow_k, fast_k))| IndicatorPoint {
            timestamp: bar.timestamp,
            valid: slow_k.is_some(),
            value: IndicatorValue::Stochastic {
                slow_k: slow_k.unwrap_or(0.0),
                fast_k,
            },
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64;
                Bar {
                    timestamp: start + chrono::Duration::minutes(30 * i as i64),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 10.0,
                }
            })
            .collect()
    }

    fn slow_at(series: &IndicatorSeries, i: usize) -> Option<f64> {
        let p = &series.values[i];
        match p.value {
            IndicatorValue::Stochastic { slow_k, .. } if p.valid => Some(slow_k),
            _ => None,
        }
    }

    fn fast_at(series: &IndicatorSeries, i: usize) -> Option<f64> {
        match series.values[i].value {
            IndicatorValue::Stochastic { fast_k, .. } => fast_k,
            _ => None,
        }
    }

    #[test]
    fn warmup_and_first_value() {
        let bars = make_bars(8);
        let series = calculate_stochastic(&bars, 4, 2).unwrap();

        assert_eq!(series.len(), 8);
        for i in 0..3 {
            assert_eq!(slow_at(&series, i), None);
        }
        // Window bars 0..4: low 99, high 104, close 103.
        let expected = 100.0 * (103.0 - 99.0) / (104.0 - 99.0);
        assert!((slow_at(&series, 3).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn fast_k_lags_slow_k_by_smoothing() {
        let bars = make_bars(10);
        let series = calculate_stochastic(&bars, 4, 2).unwrap();

        // slow%K is defined from index 3; fast%K needs 2 more samples to seed.
        assert_eq!(fast_at(&series, 4), None);
        assert!(fast_at(&series, 5).is_some());
    }

    #[test]
    fn flat_window_is_undefined() {
        let mut bars = make_bars(5);
        for b in &mut bars {
            b.high = 50.0;
            b.low = 50.0;
            b.close = 50.0;
        }
        let series = calculate_stochastic(&bars, 3, 2).unwrap();
        assert!((0..5).all(|i| slow_at(&series, i).is_none()));
    }

    #[test]
    fn short_series_is_insufficient() {
        let bars = make_bars(10);
        assert!(matches!(
            calculate_stochastic(&bars, DEFAULT_WINDOW, DEFAULT_SMOOTHING),
            Err(CrosswatchError::InsufficientWarmup { bars: 10, .. })
        ));
    }

    #[test]
    fn fast_k_absent_when_too_few_slow_samples() {
        let bars = make_bars(5);
        let series = calculate_stochastic(&bars, 4, 3).unwrap();
        assert!(slow_at(&series, 4).is_some());
        assert!((0..5).all(|i| fast_at(&series, i).is_none()));
    }
}
