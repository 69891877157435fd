//! Replay driver: re-runs the decision engine over historical bars.
//!
//! Starting at the as-of date, the clock advances one bar at a time and every
//! tick sees only the bars up to and including the current one. The first
//! position opened is followed until it closes; a position still open when the
//! data runs out is valued at the last close. Each instrument yields exactly
//! one `ReplayRow`.

use chrono::{Duration, NaiveDateTime};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use crate::domain::acceptance::AcceptanceMetrics;
use crate::domain::decision::{Decision, TickInput, evaluate_tick};
use crate::domain::error::CrosswatchError;
use crate::domain::execution::{self, EntryOrder, EntryResult};
use crate::domain::exit::ExitStrategy;
use crate::domain::indicator_helpers::compute_frame;
use crate::domain::ledger::AccountLedger;
use crate::domain::ohlcv::{Bar, last_index_at_or_before, validate_bars};
use crate::domain::position::{ExitReason, TradeRecord};
use crate::domain::settings::TradeLogicParams;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOutcome {
    NeverBought,
    BoughtNeverSold,
    BoughtAndSold,
    SoldBySupport,
}

impl fmt::Display for ReplayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplayOutcome::NeverBought => "Never bought",
            ReplayOutcome::BoughtNeverSold => "Bought but never sold",
            ReplayOutcome::BoughtAndSold => "Bought and sold",
            ReplayOutcome::SoldBySupport => "Bought and sold because of support level",
        };
        write!(f, "{}", s)
    }
}

/// One flat CSV row per replayed instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayRow {
    pub instrument: String,
    pub exchange: String,
    pub as_of: NaiveDateTime,
    pub outcome: ReplayOutcome,
    pub bought: Option<NaiveDateTime>,
    pub sold: Option<NaiveDateTime>,
    pub price_bought: Option<f64>,
    /// Quantity-weighted over all legs.
    pub price_sold: Option<f64>,
    pub quantity: Option<f64>,
    pub legs: usize,
    pub result: f64,
    pub reason: Option<ExitReason>,
    pub latest_drop: Option<f64>,
    pub big_ema_derivative: Option<f64>,
    pub entry_rsi: Option<f64>,
    pub entry_slow_k: Option<f64>,
    pub entry_macd: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ReplayResult {
    pub row: ReplayRow,
    pub record: Option<TradeRecord>,
}

pub struct ReplayContext<'a> {
    pub trade: &'a TradeLogicParams,
    pub strategy: &'a dyn ExitStrategy,
    pub starting_balance: f64,
    pub lookback_days: i64,
    pub horizon_days: i64,
}

/// Replay every instrument in parallel. Instruments that cannot be replayed
/// are logged and left out.
pub fn run_replay(
    data: &dyn DataPort,
    instruments: &[String],
    exchange: &str,
    as_of: NaiveDateTime,
    ctx: &ReplayContext<'_>,
) -> Vec<ReplayResult> {
    instruments
        .par_iter()
        .filter_map(
            |instrument| match replay_instrument(data, instrument, exchange, as_of, ctx) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(instrument = instrument.as_str(), error = %e, "skipping instrument");
                    None
                }
            },
        )
        .collect()
}

pub fn replay_instrument(
    data: &dyn DataPort,
    instrument: &str,
    exchange: &str,
    as_of: NaiveDateTime,
    ctx: &ReplayContext<'_>,
) -> Result<ReplayResult, CrosswatchError> {
    let start = as_of - Duration::days(ctx.lookback_days);
    let end = as_of + Duration::days(ctx.horizon_days);
    let bars = data.fetch_bars(instrument, start, end, &ctx.trade.interval)?;
    replay_bars(instrument, exchange, &bars, as_of, ctx)
}

/// Replay over bars already in memory.
pub fn replay_bars(
    instrument: &str,
    exchange: &str,
    bars: &[Bar],
    as_of: NaiveDateTime,
    ctx: &ReplayContext<'_>,
) -> Result<ReplayResult, CrosswatchError> {
    validate_bars(instrument, bars)?;
    let first = last_index_at_or_before(bars, as_of).ok_or_else(|| CrosswatchError::NoData {
        instrument: instrument.to_string(),
    })?;
    let last = bars.len() - 1;

    let mut ledger = AccountLedger::new(ctx.starting_balance);
    let mut entry_metrics = None;
    let mut record = None;
    let spec = ctx.trade.frame_spec(false);

    for i in first..=last {
        let window = &bars[..=i];
        let frame = match compute_frame(window, &spec) {
            Ok(frame) => frame,
            Err(e) if e.is_recoverable() => {
                debug!(instrument, error = %e, "abstaining");
                continue;
            }
            Err(e) => return Err(e),
        };
        let input = TickInput {
            instrument,
            exchange,
            frame: &frame,
            now: bars[i].timestamp,
            end_of_data: i == last,
        };

        match evaluate_tick(&input, ledger.get_position(instrument), ctx.trade, ctx.strategy) {
            Decision::Abstain(e) => debug!(instrument, error = %e, "abstaining"),
            Decision::Hold => {}
            Decision::NoEntry(rejection) => debug!(instrument, %rejection, "no entry"),
            Decision::Enter {
                time,
                price,
                metrics,
            } => {
                let snapshot = compute_frame(window, &ctx.trade.frame_spec(true))
                    .map(|full| full.snapshot_at(i))
                    .unwrap_or_else(|_| frame.snapshot_at(i));
                let order = EntryOrder {
                    instrument,
                    exchange,
                    time,
                    price,
                    money_per_trade: ctx.trade.money_per_trade,
                    snapshot,
                };
                match execution::enter_long(&mut ledger, order) {
                    EntryResult::Entered { .. } => entry_metrics = Some(metrics),
                    other => debug!(instrument, result = ?other, "entry skipped"),
                }
            }
            Decision::Exit { legs } => {
                record = execution::apply_exit_legs(&mut ledger, instrument, legs);
                if record.is_some() {
                    break;
                }
            }
        }
    }

    if ledger.has_position(instrument) {
        let close = &bars[last];
        record = execution::close_out(
            &mut ledger,
            instrument,
            close.timestamp,
            close.close,
            ExitReason::EndOfData,
        );
    }

    let row = build_row(instrument, exchange, as_of, record.as_ref(), entry_metrics);
    Ok(ReplayResult { row, record })
}

fn build_row(
    instrument: &str,
    exchange: &str,
    as_of: NaiveDateTime,
    record: Option<&TradeRecord>,
    metrics: Option<AcceptanceMetrics>,
) -> ReplayRow {
    let Some(record) = record else {
        return ReplayRow {
            instrument: instrument.to_string(),
            exchange: exchange.to_string(),
            as_of,
            outcome: ReplayOutcome::NeverBought,
            bought: None,
            sold: None,
            price_bought: None,
            price_sold: None,
            quantity: None,
            legs: 0,
            result: 0.0,
            reason: None,
            latest_drop: None,
            big_ema_derivative: None,
            entry_rsi: None,
            entry_slow_k: None,
            entry_macd: None,
        };
    };

    let outcome = match record.reason {
        ExitReason::SupportLevelBreach => ReplayOutcome::SoldBySupport,
        ExitReason::EndOfData => ReplayOutcome::BoughtNeverSold,
        _ => ReplayOutcome::BoughtAndSold,
    };
    ReplayRow {
        instrument: instrument.to_string(),
        exchange: exchange.to_string(),
        as_of,
        outcome,
        bought: Some(record.entry_time),
        sold: record.exit_time(),
        price_bought: Some(record.entry_price),
        price_sold: Some(record.average_exit_price()),
        quantity: Some(record.quantity.as_f64()),
        legs: record.legs.len(),
        result: record.realized_pnl,
        reason: Some(record.reason),
        latest_drop: metrics.as_ref().and_then(|m| m.latest_drop),
        big_ema_derivative: metrics.as_ref().and_then(|m| m.big_ema_derivative),
        entry_rsi: record.entry_snapshot.rsi,
        entry_slow_k: record.entry_snapshot.slow_k,
        entry_macd: record.entry_snapshot.macd_line,
    }
}
