//! Entry filters ("acceptance parameters") and the support level.
//!
//! All metrics are computed from the causal window ending at `index`, the
//! bar currently being evaluated.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::fmt;

use crate::domain::calendar::ExchangeCalendar;
use crate::domain::crossover::events_between;
use crate::domain::indicator_helpers::IndicatorFrame;
use crate::domain::settings::TradeLogicParams;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptanceMetrics {
    pub big_ema_count: usize,
    /// %/hour over the business-day window.
    pub big_ema_derivative: Option<f64>,
    pub ema_surface_plus: f64,
    pub ema_surface_min: f64,
    pub number_of_ema_crossings: usize,
    /// %/hour over the last `drop_period` seconds.
    pub latest_drop: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryRejection {
    WarmUp { have: usize, need: usize },
    Derivative(Option<f64>),
    SurfacePlus(f64),
    SurfaceMin(f64),
    Crossings(usize),
    Drop(Option<f64>),
    Unconfirmed,
    InsufficientCash { needed: f64, available: f64 },
    ZeroQuantity,
}

impl fmt::Display for EntryRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryRejection::WarmUp { have, need } => {
                write!(f, "only {} big EMA values, need {}", have, need)
            }
            EntryRejection::Derivative(Some(d)) => write!(f, "big EMA derivative {:.3}%/h too steep", d),
            EntryRejection::Derivative(None) => write!(f, "big EMA derivative unavailable"),
            EntryRejection::SurfacePlus(s) => write!(f, "EMA surface plus {:.3} above threshold", s),
            EntryRejection::SurfaceMin(s) => write!(f, "EMA surface min {:.3} below threshold", s),
            EntryRejection::Crossings(n) => write!(f, "only {} EMA crossings in window", n),
            EntryRejection::Drop(Some(d)) => write!(f, "latest drop {:.3}%/h below threshold", d),
            EntryRejection::Drop(None) => write!(f, "latest drop unavailable"),
            EntryRejection::Unconfirmed => write!(f, "crossing not confirmed by exit strategy"),
            EntryRejection::InsufficientCash { needed, available } => {
                write!(f, "needs {:.2} cash, {:.2} available", needed, available)
            }
            EntryRejection::ZeroQuantity => write!(f, "position size rounds to zero"),
        }
    }
}

pub fn compute_metrics(
    frame: &IndicatorFrame,
    index: usize,
    calendar: &ExchangeCalendar,
    params: &TradeLogicParams,
) -> AcceptanceMetrics {
    let latest = frame.timestamps[index];
    let window_start = calendar.window_start(latest, params.window_days);
    let first = frame.timestamps[..=index].partition_point(|t| *t < window_start);

    let big_ema_count = frame.big_ema[..=index].iter().flatten().count();

    let mut surface_plus = 0.0;
    let mut surface_min = 0.0;
    for i in first..=index {
        if let (Some(small), Some(big)) = (frame.small_ema[i], frame.big_ema[i]) {
            let rel = (small - big) / big * 100.0;
            if rel > 0.0 {
                surface_plus += rel;
            } else {
                surface_min += rel;
            }
        }
    }

    let events = frame.small_big_crossovers();
    let number_of_ema_crossings = events_between(&events, window_start, latest).count();

    AcceptanceMetrics {
        big_ema_count,
        big_ema_derivative: big_ema_derivative(frame, first, index),
        ema_surface_plus: surface_plus,
        ema_surface_min: surface_min,
        number_of_ema_crossings,
        latest_drop: latest_drop(frame, index, params.drop_period_secs),
    }
}

fn big_ema_derivative(frame: &IndicatorFrame, first: usize, last: usize) -> Option<f64> {
    let defined: Vec<(NaiveDateTime, f64)> = (first..=last)
        .filter_map(|i| frame.big_ema[i].map(|v| (frame.timestamps[i], v)))
        .collect();
    let (t0, v0) = *defined.first()?;
    let (t1, v1) = *defined.last()?;
    let hours = (t1 - t0).num_seconds() as f64 / 3600.0;
    if hours <= 0.0 || v0 == 0.0 {
        return None;
    }
    Some((v1 - v0) / v0 * 100.0 / hours)
}

fn latest_drop(frame: &IndicatorFrame, index: usize, period_secs: i64) -> Option<f64> {
    let latest = frame.timestamps[index];
    let from = latest - Duration::seconds(period_secs);
    // Bars in (latest - period, latest].
    let first = frame.timestamps[..=index].partition_point(|t| *t <= from);
    if index < first + 1 {
        return None;
    }

    let mut max_i = first;
    let mut min_i = first;
    for i in first..=index {
        if frame.close[i] > frame.close[max_i] {
            max_i = i;
        }
        if frame.close[i] < frame.close[min_i] {
            min_i = i;
        }
    }

    let (max, min) = (frame.close[max_i], frame.close[min_i]);
    let hours = (frame.timestamps[max_i] - frame.timestamps[min_i])
        .num_seconds()
        .abs() as f64
        / 3600.0;
    if hours == 0.0 || min + max == 0.0 {
        return Some(0.0);
    }
    Some((min - max) / (min + max) * 2.0 * 100.0 / hours)
}

/// Checks the metrics against the configured thresholds, first failure wins.
pub fn check_filters(
    metrics: &AcceptanceMetrics,
    params: &TradeLogicParams,
) -> Result<(), EntryRejection> {
    if metrics.big_ema_count < params.number_of_big_emas_threshold {
        return Err(EntryRejection::WarmUp {
            have: metrics.big_ema_count,
            need: params.number_of_big_emas_threshold,
        });
    }
    match metrics.big_ema_derivative {
        Some(d) if d.abs() <= params.big_ema_derivative_threshold => {}
        other => return Err(EntryRejection::Derivative(other)),
    }
    if metrics.ema_surface_plus > params.ema_surface_plus_threshold {
        return Err(EntryRejection::SurfacePlus(metrics.ema_surface_plus));
    }
    if metrics.ema_surface_min < params.ema_surface_min_threshold {
        return Err(EntryRejection::SurfaceMin(metrics.ema_surface_min));
    }
    if metrics.number_of_ema_crossings < params.number_of_ema_crossings {
        return Err(EntryRejection::Crossings(metrics.number_of_ema_crossings));
    }
    match metrics.latest_drop {
        Some(d) if d >= params.drop_threshold => Ok(()),
        other => Err(EntryRejection::Drop(other)),
    }
}

/// Minimum close of the bars inside the trailing `support_days` business-day
/// window, excluding the bar at `index`, scaled by `support_percentage`.
pub fn support_level(
    frame: &IndicatorFrame,
    index: usize,
    calendar: &ExchangeCalendar,
    params: &TradeLogicParams,
) -> Option<f64> {
    let start = calendar.window_start(frame.timestamps[index], params.support_days);
    let first = frame.timestamps[..index].partition_point(|t| *t < start);
    let min = frame.close[first..index]
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |m| m.min(c))))?;
    Some(min * params.support_percentage / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator_helpers::{FrameSpec, compute_frame};
    use crate::domain::ohlcv::Bar;
    use chrono::NaiveDate;

    fn bars_from(start: NaiveDateTime, step_min: i64, closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::minutes(step_min * i as i64),
                open: close,
                high: close + 0.1,
                low: close - 0.1,
                close,
                volume: 100.0,
            })
            .collect()
    }

    fn monday() -> NaiveDateTime {
        // 2024-03-04 is a Monday.
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn frame(bars: &[Bar]) -> IndicatorFrame {
        compute_frame(
            bars,
            &FrameSpec {
                small_ema: 1,
                big_ema: 2,
                advanced_ema: 2,
                oscillators: false,
            },
        )
        .unwrap()
    }

    fn params() -> TradeLogicParams {
        TradeLogicParams {
            number_of_big_emas_threshold: 3,
            window_days: 1,
            drop_period_secs: 3600,
            support_days: 5,
            support_percentage: 90.0,
            ..TradeLogicParams::default()
        }
    }

    fn nyse() -> ExchangeCalendar {
        ExchangeCalendar::for_exchange("NYSE").unwrap()
    }

    #[test]
    fn support_level_excludes_current_bar() {
        let bars = bars_from(monday(), 30, &[12.0, 10.0, 11.0, 10.5, 8.9]);
        let f = frame(&bars);
        let level = support_level(&f, 4, &nyse(), &params()).unwrap();
        assert!((level - 9.0).abs() < 1e-12);
        assert!(f.close[4] <= level);
    }

    #[test]
    fn support_level_needs_prior_bars() {
        let bars = bars_from(monday(), 30, &[12.0, 10.0, 11.0, 10.5]);
        let f = frame(&bars);
        assert_eq!(support_level(&f, 0, &nyse(), &params()), None);
    }

    #[test]
    fn support_window_is_business_days() {
        // Two closes a week apart: the older one falls outside a 1-day window.
        let mut bars = bars_from(monday() - Duration::days(7), 30, &[5.0, 5.0, 5.0]);
        bars.extend(bars_from(monday(), 30, &[10.0, 11.0, 12.0]));
        let f = frame(&bars);
        let p = TradeLogicParams {
            support_days: 1,
            ..params()
        };
        let level = support_level(&f, 5, &nyse(), &p).unwrap();
        assert!((level - 9.0).abs() < 1e-12);
    }

    #[test]
    fn latest_drop_in_percent_per_hour() {
        // Max 9.5 at +30m, min 9.0 half an hour later.
        let bars = bars_from(monday(), 30, &[10.0, 9.5, 9.0]);
        let f = frame(&bars);
        let drop = latest_drop(&f, 2, 3600).unwrap();
        let expected = (9.0 - 9.5) / 18.5 * 2.0 * 100.0 / 0.5;
        assert!((drop - expected).abs() < 1e-9);
    }

    #[test]
    fn latest_drop_leaves_out_the_bar_a_full_period_old() {
        // 100.0 sits exactly one hour before the latest bar.
        let bars = bars_from(monday(), 30, &[100.0, 90.0, 95.0]);
        let f = frame(&bars);
        let drop = latest_drop(&f, 2, 3600).unwrap();
        assert!((drop + 10.81).abs() < 0.01, "{}", drop);

        let p = TradeLogicParams {
            drop_threshold: -15.0,
            ..params()
        };
        let metrics = AcceptanceMetrics {
            big_ema_count: 40,
            big_ema_derivative: Some(0.1),
            ema_surface_plus: 0.0,
            ema_surface_min: 0.0,
            number_of_ema_crossings: 1,
            latest_drop: Some(drop),
        };
        assert_eq!(check_filters(&metrics, &p), Ok(()));
    }

    #[test]
    fn latest_drop_flat_is_zero() {
        let bars = bars_from(monday(), 30, &[10.0, 10.0, 10.0]);
        let f = frame(&bars);
        assert_eq!(latest_drop(&f, 2, 3600), Some(0.0));
    }

    #[test]
    fn latest_drop_needs_two_bars() {
        let bars = bars_from(monday(), 120, &[10.0, 10.0, 10.0, 10.0]);
        let f = frame(&bars);
        assert_eq!(latest_drop(&f, 3, 3600), None);
    }

    #[test]
    fn derivative_over_window() {
        let bars = bars_from(monday(), 60, &[10.0, 10.0, 10.0, 10.0, 10.0, 10.0]);
        let f = frame(&bars);
        let m = compute_metrics(&f, 5, &nyse(), &params());
        assert_eq!(m.big_ema_derivative, Some(0.0));
        assert_eq!(m.big_ema_count, 4);
        assert_eq!(m.number_of_ema_crossings, 0);
        assert!(m.ema_surface_plus.abs() < 1e-12);
    }

    #[test]
    fn filters_reject_in_order() {
        let p = TradeLogicParams {
            number_of_big_emas_threshold: 3,
            big_ema_derivative_threshold: 1.0,
            ema_surface_plus_threshold: 50.0,
            ema_surface_min_threshold: -50.0,
            number_of_ema_crossings: 1,
            drop_threshold: -5.0,
            ..TradeLogicParams::default()
        };
        let good = AcceptanceMetrics {
            big_ema_count: 10,
            big_ema_derivative: Some(0.5),
            ema_surface_plus: 10.0,
            ema_surface_min: -10.0,
            number_of_ema_crossings: 2,
            latest_drop: Some(-1.0),
        };
        assert_eq!(check_filters(&good, &p), Ok(()));

        let few = AcceptanceMetrics {
            big_ema_count: 2,
            ..good.clone()
        };
        assert_eq!(
            check_filters(&few, &p),
            Err(EntryRejection::WarmUp { have: 2, need: 3 })
        );

        let steep = AcceptanceMetrics {
            big_ema_derivative: Some(-1.5),
            ..good.clone()
        };
        assert_eq!(
            check_filters(&steep, &p),
            Err(EntryRejection::Derivative(Some(-1.5)))
        );

        let quiet = AcceptanceMetrics {
            number_of_ema_crossings: 0,
            ..good.clone()
        };
        assert_eq!(check_filters(&quiet, &p), Err(EntryRejection::Crossings(0)));

        let crash = AcceptanceMetrics {
            latest_drop: Some(-8.0),
            ..good
        };
        assert_eq!(check_filters(&crash, &p), Err(EntryRejection::Drop(Some(-8.0))));
    }
}
