//! Per-instrument decision engine.
//!
//! One call evaluates one tick: the causal indicator frame ending at the
//! latest visible bar, plus the open position if there is one. The result is
//! a `Decision`; applying it to the ledger is left to the caller so the same
//! logic drives both replay and live runs.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::acceptance::{
    AcceptanceMetrics, EntryRejection, check_filters, compute_metrics, support_level,
};
use crate::domain::calendar::ExchangeCalendar;
use crate::domain::error::CrosswatchError;
use crate::domain::exit::{EntryContext, ExitContext, ExitStrategy};
use crate::domain::indicator_helpers::IndicatorFrame;
use crate::domain::position::{ExitLeg, ExitReason, Position, Quantity};
use crate::domain::settings::TradeLogicParams;

pub struct TickInput<'a> {
    pub instrument: &'a str,
    pub exchange: &'a str,
    /// Frame over every bar visible at `now`; its last bar is evaluated.
    pub frame: &'a IndicatorFrame,
    pub now: NaiveDateTime,
    /// No bar will ever follow the last one in `frame`.
    pub end_of_data: bool,
}

#[derive(Debug)]
pub enum Decision {
    /// Data problem this tick; nothing changes.
    Abstain(CrosswatchError),
    Hold,
    NoEntry(EntryRejection),
    Enter {
        time: NaiveDateTime,
        price: f64,
        metrics: AcceptanceMetrics,
    },
    /// New legs to apply, in order.
    Exit { legs: Vec<ExitLeg> },
}

pub fn evaluate_tick(
    input: &TickInput<'_>,
    position: Option<&Position>,
    params: &TradeLogicParams,
    strategy: &dyn ExitStrategy,
) -> Decision {
    let frame = input.frame;
    let Some(index) = frame.len().checked_sub(1) else {
        return Decision::Abstain(CrosswatchError::NoData {
            instrument: input.instrument.to_string(),
        });
    };
    let Some(undervalued) = frame.is_undervalued(index) else {
        return Decision::Abstain(CrosswatchError::InsufficientWarmup {
            indicator: format!("EMA({})", params.big_ema_period),
            bars: frame.len(),
            required: params.big_ema_period + 1,
        });
    };
    let calendar = match ExchangeCalendar::for_exchange(input.exchange) {
        Ok(calendar) => calendar,
        Err(e) => return Decision::Abstain(e),
    };

    match (position, undervalued) {
        (None, false) => Decision::Hold,
        (None, true) => evaluate_entry(input, index, &calendar, params, strategy),
        (Some(pos), true) => {
            let mut legs = if strategy.monitors_while_undervalued() {
                match check_staleness(input, params) {
                    Ok(()) => pending_legs(input, pos, strategy),
                    Err(e) => {
                        debug!(instrument = input.instrument, error = %e, "exit strategy skipped");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };

            let close = frame.close[index];
            if let Some(level) = support_level(frame, index, &calendar, params) {
                let planned: Quantity = legs.iter().map(|l| l.quantity).sum();
                let remaining = pos.remaining_quantity().saturating_sub(planned);
                if close <= level && !remaining.is_zero() {
                    debug!(instrument = input.instrument, close, level, "support level breached");
                    legs.push(ExitLeg {
                        time: frame.timestamps[index],
                        price: close,
                        quantity: remaining,
                        reason: ExitReason::SupportLevelBreach,
                    });
                }
            }
            exit_or_hold(legs)
        }
        (Some(pos), false) => match check_staleness(input, params) {
            Ok(()) => exit_or_hold(pending_legs(input, pos, strategy)),
            Err(e) => Decision::Abstain(e),
        },
    }
}

fn evaluate_entry(
    input: &TickInput<'_>,
    index: usize,
    calendar: &ExchangeCalendar,
    params: &TradeLogicParams,
    strategy: &dyn ExitStrategy,
) -> Decision {
    let frame = input.frame;
    let metrics = compute_metrics(frame, index, calendar, params);
    if let Err(rejection) = check_filters(&metrics, params) {
        return Decision::NoEntry(rejection);
    }
    if let Err(e) = check_staleness(input, params) {
        return Decision::Abstain(e);
    }
    if !strategy.confirm_entry(&EntryContext { frame, index }) {
        return Decision::NoEntry(EntryRejection::Unconfirmed);
    }
    Decision::Enter {
        time: frame.timestamps[index],
        price: frame.close[index],
        metrics,
    }
}

/// Legs of the strategy's plan that are not on the position yet.
fn pending_legs(
    input: &TickInput<'_>,
    position: &Position,
    strategy: &dyn ExitStrategy,
) -> Vec<ExitLeg> {
    let plan = strategy.plan(&ExitContext {
        position,
        frame: input.frame,
        end_of_data: input.end_of_data,
    });
    plan.legs.into_iter().skip(position.legs.len()).collect()
}

fn exit_or_hold(legs: Vec<ExitLeg>) -> Decision {
    if legs.is_empty() {
        Decision::Hold
    } else {
        Decision::Exit { legs }
    }
}

pub fn check_staleness(input: &TickInput<'_>, params: &TradeLogicParams) -> Result<(), CrosswatchError> {
    let Some(latest) = input.frame.timestamps.last() else {
        return Err(CrosswatchError::NoData {
            instrument: input.instrument.to_string(),
        });
    };
    let age_secs = (input.now - *latest).num_seconds();
    if age_secs > params.latency_threshold_secs {
        return Err(CrosswatchError::StaleData {
            instrument: input.instrument.to_string(),
            age_secs,
            threshold_secs: params.latency_threshold_secs,
        });
    }
    Ok(())
}
