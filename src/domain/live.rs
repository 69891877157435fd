//! Live cycle runner.
//!
//! Each cycle polls the command channel, evaluates every instrument in
//! parallel against the shared ledger, pushes closed trades to the trade sink
//! and writes a state snapshot. The stop flag is checked once per cycle, so a
//! cycle in flight always completes.
//!
//! An instrument whose position closes is retired for the rest of the
//! session, as is one the operator stops monitoring. Retired instruments are
//! not fetched or evaluated again unless a force-buy names them.

use chrono::{Duration, NaiveDateTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::domain::acceptance::support_level;
use crate::domain::calendar::ExchangeCalendar;
use crate::domain::decision::{Decision, TickInput, evaluate_tick};
use crate::domain::error::CrosswatchError;
use crate::domain::execution::{self, EntryOrder, EntryResult};
use crate::domain::exit::ExitStrategy;
use crate::domain::indicator_helpers::{IndicatorFrame, compute_frame};
use crate::domain::ledger::{AccountLedger, SharedLedger};
use crate::domain::ohlcv::{Bar, validate_bars};
use crate::domain::position::{ExitReason, TradeRecord};
use crate::domain::settings::{LiveSettings, TradeLogicParams};
use crate::ports::command_port::CommandPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{SnapshotPort, TradeSink};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    ForceSell(String),
    ForceSellAll,
    ForceBuy(String),
    /// Retire an instrument that is not held.
    StopMonitor(String),
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentSnapshot {
    pub instrument: String,
    pub exchange: String,
    pub monitored: bool,
    pub held: bool,
    pub quantity: Option<f64>,
    pub entry_price: Option<f64>,
    pub entry_time: Option<NaiveDateTime>,
    /// Mid price of the latest bar.
    pub current_value: Option<f64>,
    /// Realized legs plus the open remainder valued at `current_value`.
    pub virtual_result: Option<f64>,
    pub support_level: Option<f64>,
    pub last_data_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub snapshots: Vec<InstrumentSnapshot>,
    pub closed: Vec<TradeRecord>,
    /// Cash plus open positions at their latest mid price.
    pub equity: f64,
}

#[derive(Debug, Default)]
struct Overrides {
    sell_all: bool,
    sell: HashSet<String>,
    buy: HashSet<String>,
}

pub struct LiveRunner<'a> {
    pub data: &'a dyn DataPort,
    pub commands: &'a dyn CommandPort,
    pub snapshots: &'a dyn SnapshotPort,
    pub trades: &'a dyn TradeSink,
    pub trade: &'a TradeLogicParams,
    pub strategy: &'a dyn ExitStrategy,
    pub exchange: &'a str,
    pub instruments: &'a [String],
    pub ledger: SharedLedger,
    pub stop: Arc<AtomicBool>,
    /// Instruments done for this session.
    pub retired: Mutex<HashSet<String>>,
}

/// The part of a runner that is shared with the per-instrument workers.
struct Evaluator<'a> {
    data: &'a dyn DataPort,
    trade: &'a TradeLogicParams,
    strategy: &'a dyn ExitStrategy,
    exchange: &'a str,
    ledger: &'a SharedLedger,
}

fn lock(ledger: &SharedLedger) -> MutexGuard<'_, AccountLedger> {
    ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LiveRunner<'_> {
    /// Runs cycles until the round limit or a stop request. `clock` supplies
    /// the evaluation time of each cycle and `sleep` waits between cycles.
    pub fn run<C, S>(&self, settings: &LiveSettings, clock: C, sleep: S) -> Result<(), CrosswatchError>
    where
        C: Fn() -> NaiveDateTime,
        S: Fn(std::time::Duration),
    {
        let mut round: u64 = 0;
        let mut now = clock();
        while !self.stop.load(Ordering::SeqCst) {
            now = clock();
            self.run_cycle(now)?;
            round += 1;
            if settings.rounds > 0 && round >= settings.rounds {
                break;
            }
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            sleep(std::time::Duration::from_secs(settings.seconds_to_sleep));
        }
        info!(rounds = round, "live loop finished");

        if settings.sell_all_before_finish {
            self.sell_all(now)?;
        }
        Ok(())
    }

    pub fn run_cycle(&self, now: NaiveDateTime) -> Result<CycleReport, CrosswatchError> {
        let overrides = self.poll_commands();
        let retired = self.retired_instruments();

        let evaluator = self.evaluator();
        let results: Vec<(InstrumentSnapshot, Option<TradeRecord>)> = self
            .instruments
            .par_iter()
            .map(|instrument| evaluator.evaluate_instrument(instrument, now, &overrides, &retired))
            .collect();

        let mut report = CycleReport::default();
        for (mut snapshot, record) in results {
            if let Some(record) = record {
                self.retire(&record.instrument);
                snapshot.monitored = false;
                self.trades.push(&record)?;
                report.closed.push(record);
            }
            report.snapshots.push(snapshot);
        }

        let prices: HashMap<String, f64> = report
            .snapshots
            .iter()
            .filter_map(|s| s.current_value.map(|v| (s.instrument.clone(), v)))
            .collect();
        report.equity = lock(&self.ledger).total_equity(&prices);
        info!(equity = report.equity, closed = report.closed.len(), "cycle finished");

        self.snapshots.write_snapshot(&report.snapshots)?;
        Ok(report)
    }

    pub fn retired_instruments(&self) -> HashSet<String> {
        self.retired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn retire(&self, instrument: &str) {
        self.retired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(instrument.to_string());
    }

    /// Close every open position at its latest close.
    pub fn sell_all(&self, now: NaiveDateTime) -> Result<Vec<TradeRecord>, CrosswatchError> {
        let held: Vec<String> = lock(&self.ledger).positions.keys().cloned().collect();
        let mut closed = Vec::new();
        for instrument in held {
            let Some(bars) = self.evaluator().fetch(&instrument, now) else {
                warn!(instrument = instrument.as_str(), "no data to sell at");
                continue;
            };
            let Some(last) = bars.last() else {
                continue;
            };
            let record = execution::close_out(
                &mut lock(&self.ledger),
                &instrument,
                last.timestamp,
                last.close,
                ExitReason::ForcedByUser,
            );
            if let Some(record) = record {
                self.retire(&record.instrument);
                self.trades.push(&record)?;
                closed.push(record);
            }
        }
        Ok(closed)
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            data: self.data,
            trade: self.trade,
            strategy: self.strategy,
            exchange: self.exchange,
            ledger: &self.ledger,
        }
    }

    fn poll_commands(&self) -> Overrides {
        let mut overrides = Overrides::default();
        let commands = match self.commands.poll() {
            Ok(commands) => commands,
            Err(e) => {
                warn!(error = %e, "command channel unavailable");
                return overrides;
            }
        };
        for command in commands {
            info!(?command, "command received");
            match command {
                Command::ForceSell(instrument) => {
                    overrides.sell.insert(instrument.to_uppercase());
                }
                Command::ForceSellAll => overrides.sell_all = true,
                Command::ForceBuy(instrument) => {
                    overrides.buy.insert(instrument.to_uppercase());
                }
                Command::StopMonitor(instrument) => {
                    let instrument = instrument.to_uppercase();
                    if lock(&self.ledger).has_position(&instrument) {
                        debug!(instrument = instrument.as_str(), "held, still monitored");
                    } else {
                        self.retire(&instrument);
                    }
                }
                Command::Stop => self.stop.store(true, Ordering::SeqCst),
            }
        }
        overrides
    }
}

impl Evaluator<'_> {
    fn fetch(&self, instrument: &str, now: NaiveDateTime) -> Option<Vec<Bar>> {
        let start = now - Duration::days(self.trade.historic_days);
        match self
            .data
            .fetch_bars(instrument, start, now, &self.trade.interval)
            .and_then(|bars| validate_bars(instrument, &bars).map(|()| bars))
        {
            Ok(bars) if bars.is_empty() => {
                debug!(instrument, "no data this cycle");
                None
            }
            Ok(bars) => Some(bars),
            Err(e) => {
                warn!(instrument, error = %e, "fetch failed");
                None
            }
        }
    }

    fn evaluate_instrument(
        &self,
        instrument: &str,
        now: NaiveDateTime,
        overrides: &Overrides,
        retired: &HashSet<String>,
    ) -> (InstrumentSnapshot, Option<TradeRecord>) {
        if retired.contains(instrument)
            && !overrides.buy.contains(instrument)
            && !lock(self.ledger).has_position(instrument)
        {
            let mut snapshot = self.snapshot(instrument, None, None);
            snapshot.monitored = false;
            return (snapshot, None);
        }
        let Some(bars) = self.fetch(instrument, now) else {
            return (self.snapshot(instrument, None, None), None);
        };
        let frame = match compute_frame(&bars, &self.trade.frame_spec(false)) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(instrument, error = %e, "abstaining");
                return (self.snapshot(instrument, Some(&bars), None), None);
            }
        };
        let index = frame.len() - 1;
        let (time, close) = (frame.timestamps[index], frame.close[index]);

        let record = if overrides.sell_all || overrides.sell.contains(instrument) {
            execution::close_out(
                &mut lock(self.ledger),
                instrument,
                time,
                close,
                ExitReason::ForcedByUser,
            )
        } else if overrides.buy.contains(instrument) {
            self.enter(instrument, &bars, &frame);
            None
        } else {
            self.decide(instrument, &bars, &frame, now)
        };

        (self.snapshot(instrument, Some(&bars), Some(&frame)), record)
    }

    fn decide(
        &self,
        instrument: &str,
        bars: &[Bar],
        frame: &IndicatorFrame,
        now: NaiveDateTime,
    ) -> Option<TradeRecord> {
        let position = lock(self.ledger).get_position(instrument).cloned();
        let input = TickInput {
            instrument,
            exchange: self.exchange,
            frame,
            now,
            end_of_data: false,
        };
        match evaluate_tick(&input, position.as_ref(), self.trade, self.strategy) {
            Decision::Abstain(e) => {
                debug!(instrument, error = %e, "abstaining");
                None
            }
            Decision::Hold => None,
            Decision::NoEntry(rejection) => {
                debug!(instrument, %rejection, "no entry");
                None
            }
            Decision::Enter { .. } => {
                self.enter(instrument, bars, frame);
                None
            }
            Decision::Exit { legs } => {
                execution::apply_exit_legs(&mut lock(self.ledger), instrument, legs)
            }
        }
    }

    fn enter(&self, instrument: &str, bars: &[Bar], frame: &IndicatorFrame) {
        let index = frame.len() - 1;
        let snapshot = compute_frame(bars, &self.trade.frame_spec(true))
            .map(|full| full.snapshot_at(index))
            .unwrap_or_else(|_| frame.snapshot_at(index));
        let mut ledger = lock(self.ledger);
        if ledger.has_position(instrument) {
            return;
        }
        let order = EntryOrder {
            instrument,
            exchange: self.exchange,
            time: frame.timestamps[index],
            price: frame.close[index],
            money_per_trade: self.trade.money_per_trade,
            snapshot,
        };
        match execution::enter_long(&mut ledger, order) {
            EntryResult::Entered { .. } => {}
            other => debug!(instrument, result = ?other, "entry skipped"),
        }
    }

    fn snapshot(
        &self,
        instrument: &str,
        bars: Option<&[Bar]>,
        frame: Option<&IndicatorFrame>,
    ) -> InstrumentSnapshot {
        let latest = bars.and_then(|b| b.last());
        let current_value = latest.map(Bar::mid_price);
        let support = frame.and_then(|f| {
            let calendar = ExchangeCalendar::for_exchange(self.exchange).ok()?;
            support_level(f, f.len().checked_sub(1)?, &calendar, self.trade)
        });

        let ledger = lock(self.ledger);
        let position = ledger.get_position(instrument);
        InstrumentSnapshot {
            instrument: instrument.to_string(),
            exchange: self.exchange.to_string(),
            monitored: true,
            held: position.is_some(),
            quantity: position.map(|p| p.remaining_quantity().as_f64()),
            entry_price: position.map(|p| p.entry_price),
            entry_time: position.map(|p| p.entry_time),
            current_value,
            virtual_result: position
                .zip(current_value)
                .map(|(p, value)| p.realized_pnl() + p.unrealized_pnl(value)),
            support_level: support,
            last_data_time: latest.map(|b| b.timestamp),
        }
    }
}
