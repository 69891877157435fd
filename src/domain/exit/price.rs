//! Price exit: two-stage confirm-then-trigger.
//!
//! The confirmation time is the first small/big EMA cross upward after
//! entry, or the entry time while there is none. The position is sold on the
//! first bar after entry, at or after the confirmation, where the close
//! crosses below the big EMA. That cross usually lands on an undervalued
//! tick, so the plan is checked on every held tick.

use crate::domain::crossover::CrossDirection;
use crate::domain::exit::{ExitContext, ExitPlan, ExitStrategy, ExitStrategyKind};
use crate::domain::position::ExitReason;

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceExit;

impl ExitStrategy for PriceExit {
    fn kind(&self) -> ExitStrategyKind {
        ExitStrategyKind::Price
    }

    fn monitors_while_undervalued(&self) -> bool {
        true
    }

    fn plan(&self, ctx: &ExitContext<'_>) -> ExitPlan {
        let first = ctx.first_after_entry();
        let confirmed_from = ctx
            .frame
            .small_big_crossovers()
            .into_iter()
            .find(|e| e.index >= first && e.direction == CrossDirection::Above)
            .map_or(first, |e| e.index);

        ctx.frame
            .close_big_crossovers()
            .into_iter()
            .find(|e| e.index >= confirmed_from && e.direction == CrossDirection::Below)
            .map(|e| ExitPlan::single(ctx.full_exit_at(e.index, ExitReason::CloseBelowBigEma)))
            .unwrap_or_default()
    }
}
