//! Trade execution against the account ledger.
//!
//! Entries are sized from a fixed amount of money per trade; exits apply the
//! legs chosen by the decision engine. Fills happen at the bar close, with no
//! slippage or commission model.

use chrono::NaiveDateTime;
use tracing::info;

use super::indicator_helpers::IndicatorSnapshot;
use super::ledger::AccountLedger;
use super::position::{ExitLeg, ExitReason, Position, Quantity, TradeRecord};

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered { quantity: Quantity, price: f64, cost: f64 },
    InsufficientCapital { needed: f64, available: f64 },
    ZeroQuantity,
}

/// `money_per_trade / price` rounded to two decimals.
pub fn size_entry(money_per_trade: f64, price: f64) -> Quantity {
    if price <= 0.0 || !price.is_finite() {
        return Quantity::ZERO;
    }
    Quantity::from_f64(money_per_trade / price)
}

pub struct EntryOrder<'a> {
    pub instrument: &'a str,
    pub exchange: &'a str,
    pub time: NaiveDateTime,
    pub price: f64,
    pub money_per_trade: f64,
    pub snapshot: IndicatorSnapshot,
}

/// Open a long position at the order price and debit its cost.
pub fn enter_long(ledger: &mut AccountLedger, order: EntryOrder<'_>) -> EntryResult {
    let quantity = size_entry(order.money_per_trade, order.price);
    if quantity.is_zero() {
        return EntryResult::ZeroQuantity;
    }

    let cost = quantity.as_f64() * order.price;
    if cost > ledger.cash {
        return EntryResult::InsufficientCapital {
            needed: cost,
            available: ledger.cash,
        };
    }

    ledger.open_position(Position {
        instrument: order.instrument.to_string(),
        exchange: order.exchange.to_string(),
        entry_time: order.time,
        entry_price: order.price,
        quantity,
        legs: Vec::new(),
        entry_snapshot: order.snapshot,
    });
    info!(
        instrument = order.instrument,
        time = %order.time,
        price = order.price,
        quantity = %quantity,
        "bought"
    );

    EntryResult::Entered {
        quantity,
        price: order.price,
        cost,
    }
}

/// Apply exit legs in order. Returns the trade record if the position closed.
pub fn apply_exit_legs(
    ledger: &mut AccountLedger,
    instrument: &str,
    legs: Vec<ExitLeg>,
) -> Option<TradeRecord> {
    for leg in legs {
        info!(
            instrument,
            time = %leg.time,
            price = leg.price,
            quantity = %leg.quantity,
            reason = %leg.reason,
            "sold"
        );
        if let Some(record) = ledger.apply_leg(instrument, leg) {
            info!(
                instrument,
                result = record.realized_pnl,
                reason = %record.reason,
                "position closed"
            );
            return Some(record);
        }
    }
    None
}

/// Sell whatever remains of `instrument` at `price`.
pub fn close_out(
    ledger: &mut AccountLedger,
    instrument: &str,
    time: NaiveDateTime,
    price: f64,
    reason: ExitReason,
) -> Option<TradeRecord> {
    let leg = ledger
        .get_position(instrument)?
        .close_out_leg(time, price, reason);
    apply_exit_legs(ledger, instrument, vec![leg])
}
