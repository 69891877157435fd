//! EMA exit: sell everything on the first bar after entry where the small
//! EMA crosses back above the big EMA.

use crate::domain::crossover::CrossDirection;
use crate::domain::exit::{ExitContext, ExitPlan, ExitStrategy, ExitStrategyKind};
use crate::domain::position::ExitReason;

#[derive(Debug, Clone, Copy, Default)]
pub struct EmaCrossExit;

impl ExitStrategy for EmaCrossExit {
    fn kind(&self) -> ExitStrategyKind {
        ExitStrategyKind::Ema
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
