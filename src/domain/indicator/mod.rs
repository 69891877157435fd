//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values, aligned 1:1 with its bars
//!
//! Every series has exactly one point per input bar. Points inside an
//! indicator's warm-up window carry `valid == false`.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sar;
pub mod stochastic;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Sar {
        sar: f64,
        trend: Trend,
    },
    Stochastic {
        slow_k: f64,
        fast_k: Option<f64>,
    },
    Macd {
        line: f64,
        signal: Option<f64>,
        histogram: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    ParabolicSar,
    Stochastic {
        window: usize,
        smoothing: usize,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Rsi(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The scalar at `index` for `Simple` series, `None` when undefined.
    pub fn simple_at(&self, index: usize) -> Option<f64> {
        let point = self.values.get(index)?;
        match point.value {
            IndicatorValue::Simple(v) if point.valid => Some(v),
            _ => None,
        }
    }

    /// Scalar view of a `Simple` series.
    pub fn simple_values(&self) -> Vec<Option<f64>> {
        (0..self.values.len()).map(|i| self.simple_at(i)).collect()
    }

    /// Number of defined points.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|p| p.valid).count()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::ParabolicSar => write!(f, "SAR"),
            IndicatorType::Stochastic { window, smoothing } => {
                write!(f, "STOCHASTIC({},{})", window, smoothing)
            }
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
        }
    }
}
