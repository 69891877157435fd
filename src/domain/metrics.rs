//! Replay summary statistics.

use super::replay::{ReplayOutcome, ReplayRow};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplaySummary {
    pub instruments: usize,
    pub never_bought: usize,
    pub bought_never_sold: usize,
    pub bought_and_sold: usize,
    pub sold_by_support: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    /// Won trades over all trades, 0.0 to 1.0.
    pub win_rate: f64,
    pub total_result: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_result: f64,
}

impl ReplaySummary {
    pub fn compute(rows: &[ReplayRow]) -> Self {
        let mut summary = ReplaySummary {
            instruments: rows.len(),
            ..ReplaySummary::default()
        };

        for row in rows {
            match row.outcome {
                ReplayOutcome::NeverBought => {
                    summary.never_bought += 1;
                    continue;
                }
                ReplayOutcome::BoughtNeverSold => summary.bought_never_sold += 1,
                ReplayOutcome::BoughtAndSold => summary.bought_and_sold += 1,
                ReplayOutcome::SoldBySupport => summary.sold_by_support += 1,
            }

            let result = row.result;
            summary.total_result += result;
            if result > 0.0 {
                summary.trades_won += 1;
                summary.largest_win = summary.largest_win.max(result);
            } else if result < 0.0 {
                summary.trades_lost += 1;
                summary.largest_loss = summary.largest_loss.max(result.abs());
            } else {
                summary.trades_breakeven += 1;
            }
        }

        let trades = summary.trades();
        if trades > 0 {
            summary.win_rate = summary.trades_won as f64 / trades as f64;
            summary.avg_result = summary.total_result / trades as f64;
        }
        summary
    }

    pub fn trades(&self) -> usize {
        self.trades_won + self.trades_lost + self.trades_breakeven
    }
}
