//! Account ledger: cash, open positions and the archive of closed trades.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::position::{ExitLeg, Position, TradeRecord};

/// Ledger shared between instruments evaluated in parallel. Every debit and
/// credit goes through the lock.
pub type SharedLedger = Arc<Mutex<AccountLedger>>;

#[derive(Debug, Clone)]
pub struct AccountLedger {
    pub starting_balance: f64,
    pub cash: f64,
    pub positions: HashMap<String, Position>,
    pub archive: Vec<TradeRecord>,
}

impl AccountLedger {
    pub fn new(starting_balance: f64) -> Self {
        AccountLedger {
            starting_balance,
            cash: starting_balance,
            positions: HashMap::new(),
            archive: Vec::new(),
        }
    }

    pub fn shared(starting_balance: f64) -> SharedLedger {
        Arc::new(Mutex::new(Self::new(starting_balance)))
    }

    pub fn get_position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn has_position(&self, instrument: &str) -> bool {
        self.positions.contains_key(instrument)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Debits the entry cost and starts tracking the position.
    pub fn open_position(&mut self, position: Position) {
        self.cash -= position.cost();
        self.positions.insert(position.instrument.clone(), position);
    }

    /// Credits one exit leg. The leg is capped at the quantity still open.
    /// Returns the archived record once the position is fully closed.
    pub fn apply_leg(&mut self, instrument: &str, leg: ExitLeg) -> Option<TradeRecord> {
        let position = self.positions.get_mut(instrument)?;
        let quantity = leg.quantity.min(position.remaining_quantity());
        if quantity.is_zero() {
            return None;
        }
        self.cash += quantity.as_f64() * leg.price;
        position.legs.push(ExitLeg { quantity, ..leg });
        if !position.is_closed() {
            return None;
        }

        let position = self.positions.remove(instrument)?;
        let record = TradeRecord::from_closed(position)?;
        self.archive.push(record.clone());
        Some(record)
    }

    /// Unrealized result of the open positions at `prices`; positions without
    /// a price are left out.
    pub fn virtual_result(&self, prices: &HashMap<String, f64>) -> f64 {
        self.positions
            .values()
            .filter_map(|pos| {
                prices
                    .get(&pos.instrument)
                    .map(|&price| pos.unrealized_pnl(price))
            })
            .sum()
    }

    pub fn final_result(&self) -> f64 {
        self.archive.iter().map(|r| r.realized_pnl).sum()
    }

    pub fn total_equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .filter_map(|pos| {
                prices
                    .get(&pos.instrument)
                    .map(|&price| pos.market_value(price))
            })
            .sum();
        self.cash + position_value
    }
}
