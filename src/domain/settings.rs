//! Typed run settings, read through the `ConfigPort`.
//!
//! Every component receives the section it needs explicitly. `Settings::load`
//! validates the raw configuration first, so the conversions below can
//! assume sane values.

use chrono::NaiveDateTime;
use std::path::PathBuf;

use crate::domain::config_validation::{self, TIMESTAMP_FORMAT};
use crate::domain::error::CrosswatchError;
use crate::domain::exit::ExitStrategyKind;
use crate::domain::indicator_helpers::FrameSpec;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeLogicParams {
    pub small_ema_period: usize,
    pub big_ema_period: usize,
    pub advanced_ema_period: usize,
    pub number_of_big_emas_threshold: usize,
    pub big_ema_derivative_threshold: f64,
    pub ema_surface_plus_threshold: f64,
    pub ema_surface_min_threshold: f64,
    pub number_of_ema_crossings: usize,
    pub window_days: usize,
    pub drop_period_secs: i64,
    pub drop_threshold: f64,
    pub support_days: usize,
    pub support_percentage: f64,
    pub latency_threshold_secs: i64,
    pub money_per_trade: f64,
    pub interval: String,
    pub historic_days: i64,
}

impl Default for TradeLogicParams {
    fn default() -> Self {
        TradeLogicParams {
            small_ema_period: 5,
            big_ema_period: 20,
            advanced_ema_period: 20,
            number_of_big_emas_threshold: 40,
            big_ema_derivative_threshold: 1.0,
            ema_surface_plus_threshold: 50.0,
            ema_surface_min_threshold: -50.0,
            number_of_ema_crossings: 1,
            window_days: 3,
            drop_period_secs: 3600,
            drop_threshold: -5.0,
            support_days: 5,
            support_percentage: 90.0,
            latency_threshold_secs: 3600,
            money_per_trade: 500.0,
            interval: "30m".to_string(),
            historic_days: 30,
        }
    }
}

impl TradeLogicParams {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = TradeLogicParams::default();
        let s = "trade_logic";
        TradeLogicParams {
            small_ema_period: config.get_int(s, "small_ema_period", d.small_ema_period as i64)
                as usize,
            big_ema_period: config.get_int(s, "big_ema_period", d.big_ema_period as i64) as usize,
            advanced_ema_period: config.get_int(
                s,
                "advanced_ema_period",
                d.advanced_ema_period as i64,
            ) as usize,
            number_of_big_emas_threshold: config.get_int(
                s,
                "number_of_big_emas_threshold",
                d.number_of_big_emas_threshold as i64,
            ) as usize,
            big_ema_derivative_threshold: config.get_double(
                s,
                "big_ema_derivative_threshold",
                d.big_ema_derivative_threshold,
            ),
            ema_surface_plus_threshold: config.get_double(
                s,
                "ema_surface_plus_threshold",
                d.ema_surface_plus_threshold,
            ),
            ema_surface_min_threshold: config.get_double(
                s,
                "ema_surface_min_threshold",
                d.ema_surface_min_threshold,
            ),
            number_of_ema_crossings: config.get_int(
                s,
                "number_of_ema_crossings",
                d.number_of_ema_crossings as i64,
            ) as usize,
            window_days: config.get_int(s, "window_days", d.window_days as i64) as usize,
            drop_period_secs: config.get_int(s, "drop_period", d.drop_period_secs),
            drop_threshold: config.get_double(s, "drop_threshold", d.drop_threshold),
            support_days: config.get_int(s, "support_days", d.support_days as i64) as usize,
            support_percentage: config.get_double(s, "support_percentage", d.support_percentage),
            latency_threshold_secs: config.get_int(s, "latency_threshold", d.latency_threshold_secs),
            money_per_trade: config.get_double(s, "money_per_trade", d.money_per_trade),
            interval: config.get_string(s, "interval").unwrap_or(d.interval),
            historic_days: config.get_int(s, "historic_days", d.historic_days),
        }
    }

    pub fn frame_spec(&self, oscillators: bool) -> FrameSpec {
        FrameSpec {
            small_ema: self.small_ema_period,
            big_ema: self.big_ema_period,
            advanced_ema: self.advanced_ema_period,
            oscillators,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitParams {
    pub strategy: ExitStrategyKind,
    pub simple_hold_minutes: i64,
    pub target_pct: f64,
    pub stop_pct: f64,
    pub eod_gap_minutes: i64,
    pub breakeven_pct: f64,
    pub advanced_ema_stop_pct: f64,
}

impl Default for ExitParams {
    fn default() -> Self {
        ExitParams {
            strategy: ExitStrategyKind::Ema,
            simple_hold_minutes: 15,
            target_pct: 2.0,
            stop_pct: 1.0,
            eod_gap_minutes: 500,
            breakeven_pct: 2.0,
            advanced_ema_stop_pct: 1.0,
        }
    }
}

impl ExitParams {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CrosswatchError> {
        let d = ExitParams::default();
        let s = "exit";
        let strategy = match config.get_string(s, "strategy") {
            Some(name) => name.parse()?,
            None => d.strategy,
        };
        Ok(ExitParams {
            strategy,
            simple_hold_minutes: config.get_int(s, "simple_hold_minutes", d.simple_hold_minutes),
            target_pct: config.get_double(s, "target_pct", d.target_pct),
            stop_pct: config.get_double(s, "stop_pct", d.stop_pct),
            eod_gap_minutes: config.get_int(s, "eod_gap_minutes", d.eod_gap_minutes),
            breakeven_pct: config.get_double(s, "breakeven_pct", d.breakeven_pct),
            advanced_ema_stop_pct: config.get_double(
                s,
                "advanced_ema_stop_pct",
                d.advanced_ema_stop_pct,
            ),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountParams {
    pub starting_balance: f64,
}

impl AccountParams {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        AccountParams {
            starting_balance: config.get_double("account", "starting_balance", 10_000.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSettings {
    pub exchange: String,
    pub codes: Vec<String>,
}

impl InstrumentSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CrosswatchError> {
        let exchange = config
            .get_string("instruments", "exchange")
            .map(|e| e.trim().to_uppercase())
            .ok_or_else(|| CrosswatchError::ConfigMissing {
                section: "instruments".to_string(),
                key: "exchange".to_string(),
            })?;
        let codes = config
            .get_string("instruments", "codes")
            .map(|c| parse_codes(&c))
            .unwrap_or_default();
        Ok(InstrumentSettings { exchange, codes })
    }
}

/// Comma-separated instrument codes, trimmed and upper-cased.
pub fn parse_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySettings {
    pub as_of: Option<NaiveDateTime>,
    pub lookback_days: i64,
    pub horizon_days: i64,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        ReplaySettings {
            as_of: None,
            lookback_days: 30,
            horizon_days: 59,
        }
    }
}

impl ReplaySettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CrosswatchError> {
        let d = ReplaySettings::default();
        let as_of = match config.get_string("replay", "as_of") {
            Some(raw) => Some(parse_timestamp("replay", "as_of", &raw)?),
            None => None,
        };
        Ok(ReplaySettings {
            as_of,
            lookback_days: config.get_int("replay", "lookback_days", d.lookback_days),
            horizon_days: config.get_int("replay", "horizon_days", d.horizon_days),
        })
    }
}

pub fn parse_timestamp(section: &str, key: &str, raw: &str) -> Result<NaiveDateTime, CrosswatchError> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        CrosswatchError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("expected {}, got '{}'", TIMESTAMP_FORMAT, raw.trim()),
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    /// 0 runs until stopped.
    pub rounds: u64,
    pub seconds_to_sleep: u64,
    pub sell_all_before_finish: bool,
    pub commands_file: Option<PathBuf>,
    pub snapshot_file: Option<PathBuf>,
    /// Closed trades are appended here as CSV rows.
    pub trades_file: Option<PathBuf>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        LiveSettings {
            rounds: 0,
            seconds_to_sleep: 60,
            sell_all_before_finish: false,
            commands_file: None,
            snapshot_file: None,
            trades_file: None,
        }
    }
}

impl LiveSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = LiveSettings::default();
        LiveSettings {
            rounds: config.get_int("live", "rounds", d.rounds as i64).max(0) as u64,
            seconds_to_sleep: config
                .get_int("live", "seconds_to_sleep", d.seconds_to_sleep as i64)
                .max(0) as u64,
            sell_all_before_finish: config.get_bool(
                "live",
                "sell_all_before_finish",
                d.sell_all_before_finish,
            ),
            commands_file: config.get_string("live", "commands_file").map(PathBuf::from),
            snapshot_file: config.get_string("live", "snapshot_file").map(PathBuf::from),
            trades_file: config.get_string("live", "trades_file").map(PathBuf::from),
        }
    }
}

/// Everything a run needs, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub trade_logic: TradeLogicParams,
    pub exit: ExitParams,
    pub account: AccountParams,
    pub instruments: InstrumentSettings,
    pub csv_dir: Option<PathBuf>,
    pub replay: ReplaySettings,
    pub live: LiveSettings,
}

impl Settings {
    pub fn load(config: &dyn ConfigPort) -> Result<Self, CrosswatchError> {
        config_validation::validate_config(config)?;
        Ok(Settings {
            trade_logic: TradeLogicParams::from_config(config),
            exit: ExitParams::from_config(config)?,
            account: AccountParams::from_config(config),
            instruments: InstrumentSettings::from_config(config)?,
            csv_dir: config.get_string("data", "csv_dir").map(PathBuf::from),
            replay: ReplaySettings::from_config(config)?,
            live: LiveSettings::from_config(config),
        })
    }
}
