//! Position tracking, exit legs and closed-trade records.
//!
//! Quantities are held in hundredths of a share so that partial exits always
//! add back up to the entry quantity.

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::domain::indicator_helpers::IndicatorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Quantity(i64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub fn from_hundredths(hundredths: i64) -> Self {
        Quantity(hundredths)
    }

    /// `value` rounded to two decimals.
    pub fn from_f64(value: f64) -> Self {
        Quantity((value * 100.0).round() as i64)
    }

    pub fn hundredths(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Larger half first: `(ceil(q/2), floor(q/2))`.
    pub fn split_half(self) -> (Quantity, Quantity) {
        let second = self.0 / 2;
        (Quantity(self.0 - second), Quantity(second))
    }

    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity((self.0 - other.0).max(0))
    }
}

impl std::ops::Add for Quantity {
    type Output = Quantity;
    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, |a, b| a + b)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

/// Why a leg was sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    SupportLevelBreach,
    EmaCrossUp,
    CloseBelowBigEma,
    TargetReached,
    StopReached,
    BreakevenStop,
    AdvancedEmaStop,
    EndOfDay,
    ForcedByUser,
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::SupportLevelBreach => "support level breach",
            ExitReason::EmaCrossUp => "small EMA crossed above big EMA",
            ExitReason::CloseBelowBigEma => "close crossed below big EMA",
            ExitReason::TargetReached => "target reached",
            ExitReason::StopReached => "stop reached",
            ExitReason::BreakevenStop => "breakeven stop",
            ExitReason::AdvancedEmaStop => "advanced EMA stop",
            ExitReason::EndOfDay => "neither reached, EOD",
            ExitReason::ForcedByUser => "forced by user",
            ExitReason::EndOfData => "end of data",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitLeg {
    pub time: NaiveDateTime,
    pub price: f64,
    pub quantity: Quantity,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub instrument: String,
    pub exchange: String,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub quantity: Quantity,
    pub legs: Vec<ExitLeg>,
    pub entry_snapshot: IndicatorSnapshot,
}

impl Position {
    pub fn sold_quantity(&self) -> Quantity {
        self.legs.iter().map(|l| l.quantity).sum()
    }

    pub fn remaining_quantity(&self) -> Quantity {
        self.quantity.saturating_sub(self.sold_quantity())
    }

    pub fn is_closed(&self) -> bool {
        self.sold_quantity() >= self.quantity
    }

    pub fn cost(&self) -> f64 {
        self.quantity.as_f64() * self.entry_price
    }

    pub fn realized_pnl(&self) -> f64 {
        self.legs
            .iter()
            .map(|l| l.quantity.as_f64() * (l.price - self.entry_price))
            .sum()
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.remaining_quantity().as_f64() * (price - self.entry_price)
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.remaining_quantity().as_f64() * price
    }

    /// Full exit of whatever is left.
    pub fn close_out_leg(&self, time: NaiveDateTime, price: f64, reason: ExitReason) -> ExitLeg {
        ExitLeg {
            time,
            price,
            quantity: self.remaining_quantity(),
            reason,
        }
    }
}

/// Immutable summary of a fully closed position.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub instrument: String,
    pub exchange: String,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub quantity: Quantity,
    pub legs: Vec<ExitLeg>,
    pub realized_pnl: f64,
    pub reason: ExitReason,
    pub entry_snapshot: IndicatorSnapshot,
}

impl TradeRecord {
    /// Archive a closed position. Returns `None` while quantity remains open.
    pub fn from_closed(position: Position) -> Option<Self> {
        if !position.is_closed() {
            return None;
        }
        let reason = position.legs.last()?.reason;
        let realized_pnl = position.realized_pnl();
        Some(TradeRecord {
            instrument: position.instrument,
            exchange: position.exchange,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            quantity: position.quantity,
            legs: position.legs,
            realized_pnl,
            reason,
            entry_snapshot: position.entry_snapshot,
        })
    }

    pub fn exit_time(&self) -> Option<NaiveDateTime> {
        self.legs.last().map(|l| l.time)
    }

    /// Quantity-weighted exit price.
    pub fn average_exit_price(&self) -> f64 {
        let qty = self.quantity.as_f64();
        if qty == 0.0 {
            return 0.0;
        }
        self.legs
            .iter()
            .map(|l| l.quantity.as_f64() * l.price)
            .sum::<f64>()
            / qty
    }

    pub fn return_pct(&self) -> f64 {
        let cost = self.quantity.as_f64() * self.entry_price;
        if cost == 0.0 {
            return 0.0;
        }
        self.realized_pnl / cost * 100.0
    }
}
