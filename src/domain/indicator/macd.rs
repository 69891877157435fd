//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! The line is defined once EMA(slow) is; signal and histogram follow after
//! the signal EMA has warmed up on the line itself.

use crate::domain::error::CrosswatchError;
use crate::domain::indicator::ema::ema_over;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[Bar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Result<IndicatorSeries, CrosswatchError> {
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    let ema_fast = ema_over(&closes, fast)?;
    let ema_slow = ema_over(&closes, slow)?;

    let line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let signal = match ema_over(&line, signal_period) {
        Ok(values) => values,
        Err(CrosswatchError::InsufficientWarmup { .. }) => vec![None; line.len()],
        Err(e) => return Err(e),
    };

    let values = bars
        .iter()
        .zip(line.iter().zip(signal))
        .map(|(bar, (line, signal))| IndicatorPoint {
            timestamp: bar.timestamp,
            valid: line.is_some(),
            value: IndicatorValue::Macd {
                line: line.unwrap_or(0.0),
                signal,
                histogram: line.zip(signal).map(|(l, s)| l - s),
            },
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type: IndicatorType::Macd {
            fast,
            slow,
            signal: signal_period,
        },
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
                let close = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.1;
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

    fn parts(series: &IndicatorSeries, i: usize) -> (Option<f64>, Option<f64>, Option<f64>) {
        let p = &series.values[i];
        match p.value {
            IndicatorValue::Macd {
                line,
                signal,
                histogram,
            } => (p.valid.then_some(line), signal, histogram),
            _ => (None, None, None),
        }
    }

    #[test]
    fn line_defined_from_slow_period() {
        let bars = make_bars(60);
        let series = calculate_macd(&bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL).unwrap();

        assert_eq!(series.len(), 60);
        assert_eq!(parts(&series, 25).0, None);
        assert!(parts(&series, 26).0.is_some());
    }

    #[test]
    fn signal_follows_after_its_own_warmup() {
        let bars = make_bars(60);
        let series = calculate_macd(&bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL).unwrap();

        // Line defined from 26; signal seeds on 26..35 and outputs from 35.
        assert_eq!(parts(&series, 34).1, None);
        let (line, signal, histogram) = parts(&series, 35);
        let (line, signal, histogram) = (line.unwrap(), signal.unwrap(), histogram.unwrap());
        assert!((histogram - (line - signal)).abs() < 1e-12);
    }

    #[test]
    fn line_is_fast_minus_slow() {
        let bars = make_bars(40);
        let series = calculate_macd(&bars, 3, 6, 2).unwrap();
        let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
        let fast = ema_over(&closes, 3).unwrap();
        let slow = ema_over(&closes, 6).unwrap();

        for i in 6..40 {
            let expected = fast[i].unwrap() - slow[i].unwrap();
            assert!((parts(&series, i).0.unwrap() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn short_series_is_insufficient() {
        let bars = make_bars(20);
        assert!(matches!(
            calculate_macd(&bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL),
            Err(CrosswatchError::InsufficientWarmup { .. })
        ));
    }

    #[test]
    fn signal_missing_without_error_when_line_is_short() {
        let bars = make_bars(30);
        let series = calculate_macd(&bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL).unwrap();
        assert!(parts(&series, 29).0.is_some());
        assert!((0..30).all(|i| parts(&series, i).1.is_none()));
    }
}
