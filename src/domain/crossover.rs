//! Crossover detection between two aligned series.
//!
//! The detector remembers the sign of the last sample where A != B. Samples
//! where either side is undefined, or where A == B, are stepped over, so a
//! run of equal values between two opposite signs counts as one crossing.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrossDirection {
    /// A crossed above B (+1).
    Above,
    /// A crossed below B (-1).
    Below,
}

impl CrossDirection {
    pub fn sign(self) -> i8 {
        match self {
            CrossDirection::Above => 1,
            CrossDirection::Below => -1,
        }
    }
}

impl fmt::Display for CrossDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossDirection::Above => write!(f, "+1"),
            CrossDirection::Below => write!(f, "-1"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossoverEvent {
    pub pair: String,
    pub index: usize,
    pub timestamp: NaiveDateTime,
    pub direction: CrossDirection,
}

/// Streaming detector; feed samples in timestamp order.
#[derive(Debug, Clone, Default)]
pub struct CrossoverDetector {
    last_sign: Option<CrossDirection>,
}

impl CrossoverDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, a: Option<f64>, b: Option<f64>) -> Option<CrossDirection> {
        let diff = a? - b?;
        let sign = if diff > 0.0 {
            CrossDirection::Above
        } else if diff < 0.0 {
            CrossDirection::Below
        } else {
            return None;
        };

        let previous = self.last_sign.replace(sign);
        match previous {
            Some(prev) if prev != sign => Some(sign),
            _ => None,
        }
    }
}

/// All crossings of `a` relative to `b`. The slices must be equally long.
pub fn detect_crossovers(
    pair: &str,
    timestamps: &[NaiveDateTime],
    a: &[Option<f64>],
    b: &[Option<f64>],
) -> Vec<CrossoverEvent> {
    let mut detector = CrossoverDetector::new();
    timestamps
        .iter()
        .zip(a.iter().zip(b))
        .enumerate()
        .filter_map(|(index, (&timestamp, (&a, &b)))| {
            detector.push(a, b).map(|direction| CrossoverEvent {
                pair: pair.to_string(),
                index,
                timestamp,
                direction,
            })
        })
        .collect()
}

/// Events with `from <= timestamp <= to`.
pub fn events_between(
    events: &[CrossoverEvent],
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> impl Iterator<Item = &CrossoverEvent> {
    events
        .iter()
        .filter(move |e| e.timestamp >= from && e.timestamp <= to)
}
