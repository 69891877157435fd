//! CLI definition and dispatch.

use chrono::{Duration, Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::sync::atomic::AtomicBool;

use crate::adapters::csv_adapter::{CsvAdapter, CsvReportAdapter, CsvTradeSink};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_adapter::{JsonCommandFile, JsonSnapshotFile};
use crate::domain::error::CrosswatchError;
use crate::domain::exit::{ExitStrategyKind, build_exit_strategy};
use crate::domain::indicator_helpers::{IndicatorFrame, compute_frame};
use crate::domain::ledger::AccountLedger;
use crate::domain::live::{Command as LiveCommand, InstrumentSnapshot, LiveRunner};
use crate::domain::metrics::ReplaySummary;
use crate::domain::ohlcv::validate_bars;
use crate::domain::position::TradeRecord;
use crate::domain::replay::{ReplayContext, ReplayRow, run_replay};
use crate::domain::settings::{InstrumentSettings, Settings, parse_timestamp};
use crate::ports::command_port::CommandPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportPort, SnapshotPort, TradeSink};

#[derive(Parser, Debug)]
#[command(name = "crosswatch", about = "EMA crossover position engine, live or replayed")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay every configured instrument from an as-of date
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [replay] as_of (YYYY-MM-DD HH:MM:SS)
        #[arg(long)]
        as_of: Option<String>,
        #[arg(long)]
        code: Option<String>,
        /// ema, price, simple or advanced
        #[arg(long)]
        exit_strategy: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the live cycle loop
    Live {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        rounds: Option<u64>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the indicator frame of one instrument as CSV
    Indicators {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Replay {
            config,
            as_of,
            code,
            exit_strategy,
            output,
        } => run_replay_command(
            &config,
            as_of.as_deref(),
            code.as_deref(),
            exit_strategy.as_deref(),
            output.as_ref(),
        ),
        Command::Live { config, rounds } => run_live(&config, rounds),
        Command::Validate { config } => run_validate(&config),
        Command::Indicators { config, code } => run_indicators(&config, &code),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// Loads and validates the file in one step.
pub fn load_settings(path: &Path) -> Result<Settings, ExitCode> {
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    Settings::load(&adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

pub fn resolve_codes(code_override: Option<&str>, instruments: &InstrumentSettings) -> Vec<String> {
    match code_override {
        Some(c) if !c.trim().is_empty() => vec![c.trim().to_uppercase()],
        _ => instruments.codes.clone(),
    }
}

fn csv_source(settings: &Settings) -> Result<CsvAdapter, CrosswatchError> {
    settings
        .csv_dir
        .clone()
        .map(CsvAdapter::new)
        .ok_or_else(|| CrosswatchError::ConfigMissing {
            section: "data".into(),
            key: "csv_dir".into(),
        })
}

fn run_replay_command(
    config_path: &Path,
    as_of_override: Option<&str>,
    code_override: Option<&str>,
    exit_override: Option<&str>,
    output_path: Option<&PathBuf>,
) -> ExitCode {
    // Stage 1: Load and validate config
    let mut settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    // Stage 2: Apply command line overrides
    if let Some(raw) = exit_override {
        match raw.parse::<ExitStrategyKind>() {
            Ok(kind) => settings.exit.strategy = kind,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    }
    settings.instruments.codes = resolve_codes(code_override, &settings.instruments);

    let as_of = match as_of_override {
        Some(raw) => parse_timestamp("replay", "as_of", raw),
        None => settings.replay.as_of.ok_or_else(|| CrosswatchError::ConfigMissing {
            section: "replay".into(),
            key: "as_of".into(),
        }),
    };
    let as_of = match as_of {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 3: Bar source
    let data = match csv_source(&settings) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let output = output_path
        .cloned()
        .unwrap_or_else(|| PathBuf::from("replay.csv"));
    run_replay_pipeline(&data, &settings, as_of, &CsvReportAdapter::new(output.clone()))
        .map(|summary| {
            print_summary(&summary);
            eprintln!("\nReplay written to: {}", output.display());
            ExitCode::SUCCESS
        })
        .unwrap_or_else(|e| {
            eprintln!("error: {e}");
            (&e).into()
        })
}

/// Replays every configured instrument and writes the rows through `report`.
pub fn run_replay_pipeline(
    data: &dyn DataPort,
    settings: &Settings,
    as_of: NaiveDateTime,
    report: &dyn ReportPort,
) -> Result<ReplaySummary, CrosswatchError> {
    let strategy = build_exit_strategy(&settings.exit);
    let ctx = ReplayContext {
        trade: &settings.trade_logic,
        strategy: strategy.as_ref(),
        starting_balance: settings.account.starting_balance,
        lookback_days: settings.replay.lookback_days,
        horizon_days: settings.replay.horizon_days,
    };

    eprintln!(
        "Replaying {} instruments on {} from {} ({} exit)",
        settings.instruments.codes.len(),
        settings.instruments.exchange,
        as_of,
        settings.exit.strategy,
    );
    let results = run_replay(
        data,
        &settings.instruments.codes,
        &settings.instruments.exchange,
        as_of,
        &ctx,
    );
    if results.is_empty() {
        return Err(CrosswatchError::NoData {
            instrument: settings.instruments.codes.join(","),
        });
    }

    let rows: Vec<ReplayRow> = results.into_iter().map(|r| r.row).collect();
    report.write_replay(&rows)?;
    Ok(ReplaySummary::compute(&rows))
}

fn print_summary(summary: &ReplaySummary) {
    eprintln!("\n=== Replay Results ===");
    eprintln!("Instruments:        {}", summary.instruments);
    eprintln!("Never bought:       {}", summary.never_bought);
    eprintln!("Bought, not sold:   {}", summary.bought_never_sold);
    eprintln!("Bought and sold:    {}", summary.bought_and_sold);
    eprintln!("Sold by support:    {}", summary.sold_by_support);
    eprintln!("Trades:             {}", summary.trades());
    eprintln!("Win Rate:           {:.1}%", summary.win_rate * 100.0);
    eprintln!("Total Result:       {:.2}", summary.total_result);
    eprintln!("Average Result:     {:.2}", summary.avg_result);
    eprintln!("Largest Win:        {:.2}", summary.largest_win);
    eprintln!("Largest Loss:       {:.2}", summary.largest_loss);
}

struct NoCommands;

impl CommandPort for NoCommands {
    fn poll(&self) -> Result<Vec<LiveCommand>, CrosswatchError> {
        Ok(Vec::new())
    }
}

struct Discard;

impl SnapshotPort for Discard {
    fn write_snapshot(&self, _snapshot: &[InstrumentSnapshot]) -> Result<(), CrosswatchError> {
        Ok(())
    }
}

impl TradeSink for Discard {
    fn push(&self, _record: &TradeRecord) -> Result<(), CrosswatchError> {
        Ok(())
    }
}

fn run_live(config_path: &Path, rounds: Option<u64>) -> ExitCode {
    let mut settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if let Some(r) = rounds {
        settings.live.rounds = r;
    }

    let data = match csv_source(&settings) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let commands: Box<dyn CommandPort> = match &settings.live.commands_file {
        Some(path) => Box::new(JsonCommandFile::new(path.clone())),
        None => Box::new(NoCommands),
    };
    let snapshots: Box<dyn SnapshotPort> = match &settings.live.snapshot_file {
        Some(path) => Box::new(JsonSnapshotFile::new(path.clone())),
        None => Box::new(Discard),
    };
    let trades: Box<dyn TradeSink> = match &settings.live.trades_file {
        Some(path) => Box::new(CsvTradeSink::new(path.clone())),
        None => Box::new(Discard),
    };

    let strategy = build_exit_strategy(&settings.exit);
    let ledger = AccountLedger::shared(settings.account.starting_balance);
    let runner = LiveRunner {
        data: &data,
        commands: commands.as_ref(),
        snapshots: snapshots.as_ref(),
        trades: trades.as_ref(),
        trade: &settings.trade_logic,
        strategy: strategy.as_ref(),
        exchange: &settings.instruments.exchange,
        instruments: &settings.instruments.codes,
        ledger: Arc::clone(&ledger),
        stop: Arc::new(AtomicBool::new(false)),
        retired: Mutex::default(),
    };

    eprintln!(
        "Running live on {} instruments ({} exit, rounds: {})",
        settings.instruments.codes.len(),
        settings.exit.strategy,
        settings.live.rounds,
    );
    if let Err(e) = runner.run(
        &settings.live,
        || Local::now().naive_local(),
        std::thread::sleep,
    ) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let retired = runner.retired_instruments().len();
    let ledger = ledger.lock().unwrap_or_else(|p| p.into_inner());
    eprintln!("\n=== Live Results ===");
    eprintln!("Closed trades:    {}", ledger.archive.len());
    eprintln!("Open positions:   {}", ledger.position_count());
    eprintln!("Retired:          {}", retired);
    eprintln!("Final result:     {:.2}", ledger.final_result());
    eprintln!("Cash:             {:.2}", ledger.cash);
    ExitCode::SUCCESS
}

pub fn run_validate(config_path: &Path) -> ExitCode {
    let settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let t = &settings.trade_logic;
    eprintln!("\nTrade logic:");
    eprintln!(
        "  EMAs: small {}, big {}, advanced {}",
        t.small_ema_period, t.big_ema_period, t.advanced_ema_period
    );
    eprintln!("  warm-up threshold: {} big EMAs", t.number_of_big_emas_threshold);
    eprintln!(
        "  window: {} business days, derivative <= {}%/h, {} crossing(s)",
        t.window_days, t.big_ema_derivative_threshold, t.number_of_ema_crossings
    );
    eprintln!(
        "  surface: plus <= {}, min >= {}",
        t.ema_surface_plus_threshold, t.ema_surface_min_threshold
    );
    eprintln!(
        "  drop: >= {}%/h over {}s, latency <= {}s",
        t.drop_threshold, t.drop_period_secs, t.latency_threshold_secs
    );
    eprintln!(
        "  support: {}% of {}-day low",
        t.support_percentage, t.support_days
    );
    eprintln!("  money per trade: {}, interval: {}", t.money_per_trade, t.interval);

    let x = &settings.exit;
    eprintln!("\nExit: {}", x.strategy);
    match x.strategy {
        ExitStrategyKind::Simple => eprintln!("  hold: {} minutes", x.simple_hold_minutes),
        ExitStrategyKind::Advanced => eprintln!(
            "  target {}%, stop {}%, breakeven {}%, EMA stop {}%, EOD gap {} minutes",
            x.target_pct, x.stop_pct, x.breakeven_pct, x.advanced_ema_stop_pct, x.eod_gap_minutes
        ),
        ExitStrategyKind::Ema | ExitStrategyKind::Price => {}
    }

    eprintln!("\nUniverse:");
    eprintln!("  exchange: {}", settings.instruments.exchange);
    eprintln!("  codes: {}", settings.instruments.codes.join(", "));
    eprintln!("  starting balance: {}", settings.account.starting_balance);

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

#[derive(Debug, Serialize)]
struct FrameRow {
    timestamp: NaiveDateTime,
    close: f64,
    small_ema: Option<f64>,
    big_ema: Option<f64>,
    advanced_ema: Option<f64>,
    sar: Option<f64>,
    slow_k: Option<f64>,
    macd: Option<f64>,
    macd_signal: Option<f64>,
    rsi: Option<f64>,
}

/// Writes one CSV row per bar of `frame`.
pub fn write_frame_csv<W: Write>(frame: &IndicatorFrame, writer: W) -> Result<(), CrosswatchError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (i, (&timestamp, &close)) in frame.timestamps.iter().zip(&frame.close).enumerate() {
        let snap = frame.snapshot_at(i);
        wtr.serialize(FrameRow {
            timestamp,
            close,
            small_ema: snap.small_ema,
            big_ema: snap.big_ema,
            advanced_ema: snap.advanced_ema,
            sar: snap.sar,
            slow_k: snap.slow_k,
            macd: snap.macd_line,
            macd_signal: snap.macd_signal,
            rsi: snap.rsi,
        })
        .map_err(|e| CrosswatchError::Export {
            reason: format!("failed to write frame: {}", e),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn run_indicators(config_path: &Path, code: &str) -> ExitCode {
    let settings = match load_settings(config_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let code = code.trim().to_uppercase();

    let result = csv_source(&settings).and_then(|data| {
        let end = settings
            .replay
            .as_of
            .unwrap_or_else(|| Local::now().naive_local());
        let start = end - Duration::days(settings.trade_logic.historic_days);
        let bars = data.fetch_bars(&code, start, end, &settings.trade_logic.interval)?;
        if bars.is_empty() {
            return Err(CrosswatchError::NoData {
                instrument: code.clone(),
            });
        }
        validate_bars(&code, &bars)?;
        let frame = compute_frame(&bars, &settings.trade_logic.frame_spec(true))?;
        write_frame_csv(&frame, std::io::stdout().lock())?;
        Ok(frame.len())
    });

    match result {
        Ok(n) => {
            eprintln!("{}: {} bars", code, n);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}
