//! Parabolic SAR (stop and reverse).
//!
//! Bar 0 seeds the state: a red bar (open > close) starts a down trend with
//! EP = SAR = low, otherwise an up trend with EP = SAR = high. Each later bar
//! moves the SAR toward the *prior* extreme point using the *prior*
//! acceleration factor. The factor grows by 0.02 on a new extreme while it is
//! still at or below 0.18, so it tops out at 0.20.

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, Trend,
};
use crate::domain::ohlcv::Bar;

pub const AF_START: f64 = 0.02;
pub const AF_STEP: f64 = 0.02;
const AF_STEP_CEILING: f64 = 0.18;

/// Running SAR state, advanced one bar at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParabolicSar {
    pub trend: Trend,
    pub extreme_point: f64,
    pub acceleration: f64,
    pub sar: f64,
}

impl ParabolicSar {
    pub fn seed(first: &Bar) -> Self {
        if first.open > first.close {
            Self {
                trend: Trend::Down,
                extreme_point: first.low,
                acceleration: AF_START,
                sar: first.low,
            }
        } else {
            Self {
                trend: Trend::Up,
                extreme_point: first.high,
                acceleration: AF_START,
                sar: first.high,
            }
        }
    }

    /// Advance by one bar. Returns true when the trend flipped on this bar.
    pub fn step(&mut self, bar: &Bar) -> bool {
        let prior_ep = self.extreme_point;
        let prior_af = self.acceleration;
        let prior_sar = self.sar;

        match self.trend {
            Trend::Up => {
                let mut af = prior_af;
                if bar.high > prior_ep && prior_af <= AF_STEP_CEILING {
                    af += AF_STEP;
                }
                let candidate = prior_sar + prior_af * (prior_ep - prior_sar);

                if candidate >= bar.low {
                    self.trend = Trend::Down;
                    self.acceleration = AF_START;
                    self.extreme_point = bar.low;
                    self.sar = bar.high.max(prior_ep);
                    return true;
                }
                self.extreme_point = prior_ep.max(bar.high);
                self.acceleration = af;
                self.sar = candidate;
            }
            Trend::Down => {
                let mut af = prior_af;
                if bar.low < prior_ep && prior_af <= AF_STEP_CEILING {
                    af += AF_STEP;
                }
                let candidate = prior_sar - prior_af * (prior_sar - prior_ep);

                if candidate <= bar.high {
                    self.trend = Trend::Up;
                    self.acceleration = AF_START;
                    self.extreme_point = bar.high;
                    self.sar = bar.low.min(prior_ep);
                    return true;
                }
                self.extreme_point = prior_ep.min(bar.low);
                self.acceleration = af;
                self.sar = candidate;
            }
        }
        false
    }
}

/// SAR for every bar. Defined from bar 0 onward; empty input gives an empty series.
pub fn calculate_sar(bars: &[Bar]) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());

    if let Some(first) = bars.first() {
        let mut state = ParabolicSar::seed(first);
        values.push(point(first, &state));
        for bar in &bars[1..] {
            state.step(bar);
            values.push(point(bar, &state));
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::ParabolicSar,
        values,
    }
}

fn point(bar: &Bar, state: &ParabolicSar) -> IndicatorPoint {
    IndicatorPoint {
        timestamp: bar.timestamp,
        valid: true,
        value: IndicatorValue::Sar {
            sar: state.sar,
            trend: state.trend,
        },
    }
}
