//! Advanced multi-leg exit.
//!
//! After entry the first close at or above the target (entry + target_pct)
//! and the first close at or below the stop (entry - stop_pct) are searched
//! independently, up to the end of the trading day. The end of day is the
//! last bar before the first gap longer than `eod_gap` after entry, or the
//! last bar once no more data will arrive.
//!
//! - stop first (ties included): sell everything at the stop.
//! - target first: sell half at the target, then the rest on the first close
//!   at or below entry - breakeven_pct, or at or below the advanced EMA minus
//!   ema_stop_pct, or at the end of day.
//! - neither before the end of day: sell everything at the end of day.
//!
//! While the end of day is still unknown the last visible bar might turn out
//! to be it, so only bars before the last visible one can trigger a leg.

use chrono::Duration;

use crate::domain::exit::{ExitContext, ExitPlan, ExitStrategy, ExitStrategyKind};
use crate::domain::position::{ExitLeg, ExitReason};
use crate::domain::settings::ExitParams;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvancedExit {
    pub target_pct: f64,
    pub stop_pct: f64,
    pub eod_gap: Duration,
    pub breakeven_pct: f64,
    pub ema_stop_pct: f64,
}

impl AdvancedExit {
    pub fn from_params(params: &ExitParams) -> Self {
        Self {
            target_pct: params.target_pct,
            stop_pct: params.stop_pct,
            eod_gap: Duration::minutes(params.eod_gap_minutes),
            breakeven_pct: params.breakeven_pct,
            ema_stop_pct: params.advanced_ema_stop_pct,
        }
    }

    fn end_of_day(&self, ctx: &ExitContext<'_>, first: usize) -> Option<usize> {
        let ts = &ctx.frame.timestamps;
        let last = ts.len().checked_sub(1)?;
        if let Some(k) = (first..last).find(|&k| ts[k + 1] - ts[k] > self.eod_gap) {
            return Some(k);
        }
        ctx.end_of_data.then_some(last)
    }

    fn second_leg_trigger(&self, ctx: &ExitContext<'_>, k: usize) -> Option<ExitReason> {
        let entry = ctx.position.entry_price;
        let close = ctx.frame.close[k];
        if close <= entry * (1.0 - self.breakeven_pct / 100.0) {
            return Some(ExitReason::BreakevenStop);
        }
        match ctx.frame.advanced_ema[k] {
            Some(ema) if close <= ema * (1.0 - self.ema_stop_pct / 100.0) => {
                Some(ExitReason::AdvancedEmaStop)
            }
            _ => None,
        }
    }
}

impl ExitStrategy for AdvancedExit {
    fn kind(&self) -> ExitStrategyKind {
        ExitStrategyKind::Advanced
    }

    fn monitors_while_undervalued(&self) -> bool {
        true
    }

    fn plan(&self, ctx: &ExitContext<'_>) -> ExitPlan {
        let frame = ctx.frame;
        let first = ctx.first_after_entry();
        if first >= frame.len() {
            return ExitPlan::pending();
        }

        let eod = self.end_of_day(ctx, first);
        // Bars in first..horizon are known to precede the end of day.
        let horizon = eod.unwrap_or(frame.len() - 1);

        let entry = ctx.position.entry_price;
        let target = entry * (1.0 + self.target_pct / 100.0);
        let stop = entry * (1.0 - self.stop_pct / 100.0);
        let target_at = (first..horizon).find(|&k| frame.close[k] >= target);
        let stop_at = (first..horizon).find(|&k| frame.close[k] <= stop);

        match (stop_at, target_at) {
            (Some(s), t) if t.is_none_or(|t| s <= t) => {
                ExitPlan::single(ctx.full_exit_at(s, ExitReason::StopReached))
            }
            (_, Some(t)) => {
                let (first_half, second_half) = ctx.position.quantity.split_half();
                let mut legs = vec![ExitLeg {
                    time: frame.timestamps[t],
                    price: frame.close[t],
                    quantity: first_half,
                    reason: ExitReason::TargetReached,
                }];
                if second_half.is_zero() {
                    return ExitPlan { legs };
                }

                let second = (t + 1..horizon)
                    .find_map(|k| self.second_leg_trigger(ctx, k).map(|r| (k, r)))
                    .or_else(|| eod.map(|e| (e, ExitReason::EndOfDay)));
                if let Some((k, reason)) = second {
                    legs.push(ExitLeg {
                        time: frame.timestamps[k],
                        price: frame.close[k],
                        quantity: second_half,
                        reason,
                    });
                }
                ExitPlan { legs }
            }
            _ => match eod {
                Some(e) => ExitPlan::single(ctx.full_exit_at(e, ExitReason::EndOfDay)),
                None => ExitPlan::pending(),
            },
        }
    }
}
