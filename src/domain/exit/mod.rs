//! Exit strategies.
//!
//! A strategy turns the bars seen since entry into an `ExitPlan`: the full,
//! ordered list of legs it would have sold so far. Plans only ever grow as
//! more bars become visible, so the decision engine applies the legs past
//! the ones already on the position.

pub mod advanced;
pub mod ema;
pub mod price;
pub mod simple;

use chrono::Duration;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::CrosswatchError;
use crate::domain::indicator_helpers::IndicatorFrame;
use crate::domain::position::{ExitLeg, ExitReason, Position};
use crate::domain::settings::ExitParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStrategyKind {
    Ema,
    Price,
    Simple,
    Advanced,
}

impl fmt::Display for ExitStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStrategyKind::Ema => write!(f, "ema"),
            ExitStrategyKind::Price => write!(f, "price"),
            ExitStrategyKind::Simple => write!(f, "simple"),
            ExitStrategyKind::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for ExitStrategyKind {
    type Err = CrosswatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ema" => Ok(ExitStrategyKind::Ema),
            "price" => Ok(ExitStrategyKind::Price),
            "simple" => Ok(ExitStrategyKind::Simple),
            "advanced" => Ok(ExitStrategyKind::Advanced),
            other => Err(CrosswatchError::InvalidConfiguration {
                reason: format!(
                    "unknown exit strategy '{}' (expected ema, price, simple or advanced)",
                    other
                ),
            }),
        }
    }
}

/// Inputs for the optional entry confirmation.
pub struct EntryContext<'a> {
    pub frame: &'a IndicatorFrame,
    /// The bar being evaluated; the last visible one.
    pub index: usize,
}

pub struct ExitContext<'a> {
    pub position: &'a Position,
    pub frame: &'a IndicatorFrame,
    /// No more bars will arrive after the last one in `frame`.
    pub end_of_data: bool,
}

impl ExitContext<'_> {
    /// Index of the first bar strictly after entry.
    pub fn first_after_entry(&self) -> usize {
        let entry = self.position.entry_time;
        self.frame.timestamps.partition_point(|t| *t <= entry)
    }

    pub fn full_exit_at(&self, index: usize, reason: ExitReason) -> ExitLeg {
        ExitLeg {
            time: self.frame.timestamps[index],
            price: self.frame.close[index],
            quantity: self.position.quantity,
            reason,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitPlan {
    pub legs: Vec<ExitLeg>,
}

impl ExitPlan {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn single(leg: ExitLeg) -> Self {
        Self { legs: vec![leg] }
    }
}

pub trait ExitStrategy: Send + Sync {
    fn kind(&self) -> ExitStrategyKind;

    /// Extra condition on top of the entry filters.
    fn confirm_entry(&self, _ctx: &EntryContext<'_>) -> bool {
        true
    }

    /// Consult `plan` on every held tick, not only while overvalued.
    fn monitors_while_undervalued(&self) -> bool {
        false
    }

    fn plan(&self, ctx: &ExitContext<'_>) -> ExitPlan;
}

pub fn build_exit_strategy(params: &ExitParams) -> Box<dyn ExitStrategy> {
    match params.strategy {
        ExitStrategyKind::Ema => Box::new(ema::EmaCrossExit),
        ExitStrategyKind::Price => Box::new(price::PriceExit),
        ExitStrategyKind::Simple => Box::new(simple::SimpleExit {
            hold: Duration::minutes(params.simple_hold_minutes),
        }),
        ExitStrategyKind::Advanced => Box::new(advanced::AdvancedExit::from_params(params)),
    }
}
