//! Simple exit: entries need a held crossing, exits take the first reverse
//! crossing of the small/big EMA pair.

use chrono::Duration;

use crate::domain::crossover::CrossDirection;
use crate::domain::exit::{EntryContext, ExitContext, ExitPlan, ExitStrategy, ExitStrategyKind};
use crate::domain::position::ExitReason;

#[derive(Debug, Clone, Copy)]
pub struct SimpleExit {
    /// How long the latest crossing must have held at entry.
    pub hold: Duration,
}

impl ExitStrategy for SimpleExit {
    fn kind(&self) -> ExitStrategyKind {
        ExitStrategyKind::Simple
    }

    fn confirm_entry(&self, ctx: &EntryContext<'_>) -> bool {
        let now = ctx.frame.timestamps[ctx.index];
        ctx.frame
            .small_big_crossovers()
            .into_iter()
            .take_while(|e| e.index <= ctx.index)
            .last()
            .is_some_and(|latest| now - latest.timestamp >= self.hold)
    }

    fn plan(&self, ctx: &ExitContext<'_>) -> ExitPlan {
        let first = ctx.first_after_entry();
        ctx.frame
            .small_big_crossovers()
            .into_iter()
            .find(|e| e.index >= first && e.direction == CrossDirection::Above)
            .map(|e| ExitPlan::single(ctx.full_exit_at(e.index, ExitReason::EmaCrossUp)))
            .unwrap_or_default()
    }
}
