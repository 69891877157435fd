//! Integration tests for the decision engine, the replay driver and the
//! file adapters working together.
//!
//! Tests cover:
//! - EMA recursion on a hand-computed series
//! - Support level breach closing a held position during replay
//! - Advanced exit legs on a target-then-breakeven path
//! - Multi-instrument replay with skipped instruments
//! - A live session driven through the JSON command file

mod common;

use chrono::Duration;
use common::*;
use crosswatch::adapters::csv_adapter::CsvTradeSink;
use crosswatch::adapters::json_adapter::{JsonCommandFile, JsonSnapshotFile};
use crosswatch::domain::exit::advanced::AdvancedExit;
use crosswatch::domain::exit::ema::EmaCrossExit;
use crosswatch::domain::exit::{ExitContext, ExitStrategy};
use crosswatch::domain::indicator::ema::calculate_ema;
use crosswatch::domain::indicator_helpers::{IndicatorFrame, IndicatorSnapshot};
use crosswatch::domain::ledger::AccountLedger;
use crosswatch::domain::live::LiveRunner;
use crosswatch::domain::metrics::ReplaySummary;
use crosswatch::domain::position::{ExitReason, Position, Quantity};
use crosswatch::domain::replay::{ReplayContext, ReplayOutcome, replay_bars, run_replay};
use crosswatch::domain::settings::{ExitParams, TradeLogicParams};
use std::fs;
use std::sync::{Arc, Mutex};
use std::sync::atomic::AtomicBool;

fn replay_context<'a>(
    trade: &'a TradeLogicParams,
    strategy: &'a dyn ExitStrategy,
) -> ReplayContext<'a> {
    ReplayContext {
        trade,
        strategy,
        starting_balance: 10_000.0,
        lookback_days: 30,
        horizon_days: 59,
    }
}

mod ema_recursion {
    use super::*;

    #[test]
    fn period_three_matches_hand_computation() {
        let bars = bars_from_closes(&[10.0, 10.0, 10.0, 10.0, 12.0, 11.0, 13.0, 12.0, 14.0]);
        let ema = calculate_ema(&bars, 3).unwrap().simple_values();

        assert_eq!(ema.len(), 9);
        assert!(ema[..3].iter().all(Option::is_none));
        let expected = [10.0, 11.0, 11.0, 12.0, 12.0, 13.0];
        for (got, want) in ema[3..].iter().zip(expected) {
            assert!((got.unwrap() - want).abs() < 1e-12, "{:?} != {}", got, want);
        }
    }
}

mod support_level {
    use super::*;

    #[test]
    fn close_below_support_forces_exit() {
        let trade = TradeLogicParams {
            support_percentage: 90.0,
            ..permissive_params()
        };
        let ctx = replay_context(&trade, &EmaCrossExit);
        // Bar 3 has a single big EMA value, so no derivative and no entry.
        // Entry at bar 4 at 10.0; at bar 5 the trailing minimum is 10.0,
        // support sits at 9.0 and 8.9 breaches it.
        let bars = bars_from_closes(&[11.0, 11.0, 11.0, 10.5, 10.0, 8.9, 8.5, 12.0]);
        let result = replay_bars("SUP", "NASDAQ", &bars, bars[3].timestamp, &ctx).unwrap();

        assert_eq!(result.row.outcome, ReplayOutcome::SoldBySupport);
        assert_eq!(result.row.bought, Some(bars[4].timestamp));
        assert_eq!(result.row.price_bought, Some(10.0));
        assert_eq!(result.row.sold, Some(bars[5].timestamp));
        assert_eq!(result.row.reason, Some(ExitReason::SupportLevelBreach));

        let record = result.record.unwrap();
        assert_eq!(record.quantity, Quantity::from_f64(50.0));
        assert_eq!(record.legs.len(), 1);
        assert!((record.realized_pnl + 55.0).abs() < 1e-6);
    }

    #[test]
    fn support_low_enough_never_triggers() {
        let trade = TradeLogicParams {
            support_percentage: 50.0,
            ..permissive_params()
        };
        let ctx = replay_context(&trade, &EmaCrossExit);
        let bars = bars_from_closes(&[11.0, 11.0, 11.0, 10.5, 10.0, 8.9, 8.5, 12.0]);
        let result = replay_bars("SUP", "NASDAQ", &bars, bars[3].timestamp, &ctx).unwrap();

        assert_eq!(result.row.outcome, ReplayOutcome::BoughtAndSold);
        assert_eq!(result.row.reason, Some(ExitReason::EmaCrossUp));
        assert_eq!(result.row.sold, Some(bars[7].timestamp));
    }
}

mod advanced_exit {
    use super::*;

    fn frame(closes: &[f64]) -> IndicatorFrame {
        let bars = bars_from_closes(closes);
        IndicatorFrame {
            timestamps: bars.iter().map(|b| b.timestamp).collect(),
            close: closes.to_vec(),
            small_ema: vec![None; closes.len()],
            big_ema: vec![None; closes.len()],
            advanced_ema: vec![Some(50.0); closes.len()],
            sar: None,
            stochastic: None,
            macd: None,
            rsi: None,
        }
    }

    fn position(quantity: Quantity) -> Position {
        Position {
            instrument: "ADV".into(),
            exchange: "NASDAQ".into(),
            entry_time: session_start(),
            entry_price: 100.0,
            quantity,
            legs: Vec::new(),
            entry_snapshot: IndicatorSnapshot::default(),
        }
    }

    #[test]
    fn target_then_breakeven_sells_both_halves() {
        let strategy = AdvancedExit::from_params(&ExitParams::default());
        let f = frame(&[100.0, 100.5, 101.0, 99.5, 101.5, 102.5, 101.0, 97.5, 98.5]);
        let pos = position(Quantity::from_f64(5.01));

        let plan = strategy.plan(&ExitContext {
            position: &pos,
            frame: &f,
            end_of_data: true,
        });

        assert_eq!(plan.legs.len(), 2);
        assert_eq!(plan.legs[0].reason, ExitReason::TargetReached);
        assert_eq!(plan.legs[0].time, f.timestamps[5]);
        assert_eq!(plan.legs[0].quantity, Quantity::from_f64(2.51));
        assert_eq!(plan.legs[1].reason, ExitReason::BreakevenStop);
        assert_eq!(plan.legs[1].time, f.timestamps[7]);
        assert_eq!(plan.legs[1].quantity, Quantity::from_f64(2.50));
        let sold: Quantity = plan.legs.iter().map(|l| l.quantity).sum();
        assert_eq!(sold, pos.quantity);
    }

    #[test]
    fn quiet_day_sells_everything_at_end_of_day() {
        let strategy = AdvancedExit::from_params(&ExitParams::default());
        let mut f = frame(&[100.0, 100.5, 101.0, 100.2, 99.8, 101.9, 100.4]);
        // Overnight gap after bar 4 ends the trading day there.
        for t in f.timestamps.iter_mut().skip(5) {
            *t += Duration::days(1);
        }
        let pos = position(Quantity::from_f64(3.0));

        let plan = strategy.plan(&ExitContext {
            position: &pos,
            frame: &f,
            end_of_data: false,
        });

        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].reason, ExitReason::EndOfDay);
        assert_eq!(plan.legs[0].time, f.timestamps[4]);
        assert_eq!(plan.legs[0].quantity, pos.quantity);
    }
}

mod replay_driver {
    use super::*;

    #[test]
    fn skips_failing_instruments_and_summarizes_the_rest() {
        let trade = permissive_params();
        let ctx = replay_context(&trade, &EmaCrossExit);
        let dip = bars_from_closes(&[10.0, 10.0, 10.0, 10.0, 9.0, 9.5, 12.0, 12.0]);
        let flat_up = bars_from_closes(&[10.0, 10.0, 10.0, 11.0, 12.0, 13.0, 14.0]);
        let as_of = dip[3].timestamp;
        let data = MockDataPort::new()
            .with_bars("DIP", dip)
            .with_bars("UP", flat_up)
            .with_error("BROKEN", "connection reset");
        let instruments: Vec<String> = ["DIP", "UP", "BROKEN", "MISSING"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let results = run_replay(&data, &instruments, "NASDAQ", as_of, &ctx);

        let mut names: Vec<&str> = results.iter().map(|r| r.row.instrument.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["DIP", "UP"]);

        let rows: Vec<_> = results.into_iter().map(|r| r.row).collect();
        let summary = ReplaySummary::compute(&rows);
        assert_eq!(summary.instruments, 2);
        assert_eq!(summary.never_bought, 1);
        assert_eq!(summary.bought_and_sold, 1);
        assert_eq!(summary.trades_won, 1);
        assert!((summary.win_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_exchange_never_enters() {
        let trade = permissive_params();
        let ctx = replay_context(&trade, &EmaCrossExit);
        let bars = bars_from_closes(&[10.0, 10.0, 10.0, 10.0, 9.0, 9.5, 12.0, 12.0]);
        let result = replay_bars("DIP", "MOON", &bars, bars[3].timestamp, &ctx).unwrap();
        assert_eq!(result.row.outcome, ReplayOutcome::NeverBought);
    }
}

mod live_session {
    use super::*;

    #[test]
    fn json_commands_drive_trades_and_snapshots() {
        let dir = tempfile::TempDir::new().unwrap();
        let commands_path = dir.path().join("commands.json");
        let snapshot_path = dir.path().join("state.json");
        let trades_path = dir.path().join("trades.csv");

        let bars = bars_from_closes(&[10.0, 10.0, 10.0, 11.0, 12.0]);
        let now = bars[4].timestamp;
        let data = MockDataPort::new().with_bars("AAPL", bars);
        let commands = JsonCommandFile::new(commands_path.clone());
        let snapshots = JsonSnapshotFile::new(snapshot_path.clone());
        let trades = CsvTradeSink::new(trades_path.clone());
        let trade = permissive_params();
        let instruments = vec!["AAPL".to_string()];
        let runner = LiveRunner {
            data: &data,
            commands: &commands,
            snapshots: &snapshots,
            trades: &trades,
            trade: &trade,
            strategy: &EmaCrossExit,
            exchange: "NASDAQ",
            instruments: &instruments,
            ledger: AccountLedger::shared(10_000.0),
            stop: Arc::new(AtomicBool::new(false)),
            retired: Mutex::default(),
        };

        fs::write(&commands_path, r#"{"tickers_to_buy": ["aapl"]}"#).unwrap();
        runner.run_cycle(now).unwrap();
        let state: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&snapshot_path).unwrap()).unwrap();
        assert_eq!(state[0]["held"], true);
        assert_eq!(state[0]["entry_price"], 12.0);

        fs::write(&commands_path, r#"{"tickers_to_sell": ["ALLSTOCKS"]}"#).unwrap();
        let report = runner.run_cycle(now).unwrap();
        assert_eq!(report.closed.len(), 1);

        let state: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&snapshot_path).unwrap()).unwrap();
        assert_eq!(state[0]["held"], false);
        assert_eq!(state[0]["monitored"], false);

        let csv = fs::read_to_string(&trades_path).unwrap();
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains("forced_by_user"));
    }
}
