//! Configuration validation.
//!
//! Validates every section before a replay or live run starts.

use crate::domain::error::CrosswatchError;
use crate::domain::exit::ExitStrategyKind;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDateTime;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), CrosswatchError> {
    validate_trade_logic(config)?;
    validate_exit(config)?;
    validate_account(config)?;
    validate_instruments(config)?;
    validate_replay(config)?;
    validate_live(config)?;
    Ok(())
}

pub fn validate_trade_logic(config: &dyn ConfigPort) -> Result<(), CrosswatchError> {
    let small = config.get_int("trade_logic", "small_ema_period", 5);
    let big = config.get_int("trade_logic", "big_ema_period", 20);
    require_positive_int(config, "trade_logic", "small_ema_period", small)?;
    require_positive_int(config, "trade_logic", "big_ema_period", big)?;
    if small >= big {
        return Err(invalid(
            "trade_logic",
            "small_ema_period",
            "small_ema_period must be less than big_ema_period",
        ));
    }
    let advanced = config.get_int("trade_logic", "advanced_ema_period", 20);
    require_positive_int(config, "trade_logic", "advanced_ema_period", advanced)?;

    for (key, default) in [("window_days", 3), ("support_days", 5)] {
        let value = config.get_int("trade_logic", key, default);
        require_positive_int(config, "trade_logic", key, value)?;
    }
    for (key, default) in [("drop_period", 3600), ("latency_threshold", 3600), ("historic_days", 30)] {
        let value = config.get_int("trade_logic", key, default);
        require_positive_int(config, "trade_logic", key, value)?;
    }

    let threshold = config.get_int("trade_logic", "number_of_big_emas_threshold", 40);
    if threshold < 0 {
        return Err(invalid(
            "trade_logic",
            "number_of_big_emas_threshold",
            "number_of_big_emas_threshold must be non-negative",
        ));
    }
    let crossings = config.get_int("trade_logic", "number_of_ema_crossings", 1);
    if crossings < 0 {
        return Err(invalid(
            "trade_logic",
            "number_of_ema_crossings",
            "number_of_ema_crossings must be non-negative",
        ));
    }

    let derivative = config.get_double("trade_logic", "big_ema_derivative_threshold", 1.0);
    if derivative < 0.0 {
        return Err(invalid(
            "trade_logic",
            "big_ema_derivative_threshold",
            "big_ema_derivative_threshold must be non-negative",
        ));
    }
    let plus = config.get_double("trade_logic", "ema_surface_plus_threshold", 50.0);
    if plus < 0.0 {
        return Err(invalid(
            "trade_logic",
            "ema_surface_plus_threshold",
            "ema_surface_plus_threshold must be non-negative",
        ));
    }
    let min = config.get_double("trade_logic", "ema_surface_min_threshold", -50.0);
    if min > 0.0 {
        return Err(invalid(
            "trade_logic",
            "ema_surface_min_threshold",
            "ema_surface_min_threshold must be zero or negative",
        ));
    }

    let support = config.get_double("trade_logic", "support_percentage", 90.0);
    if support <= 0.0 || support > 100.0 {
        return Err(invalid(
            "trade_logic",
            "support_percentage",
            "support_percentage must be in (0, 100]",
        ));
    }
    let money = config.get_double("trade_logic", "money_per_trade", 500.0);
    if money <= 0.0 {
        return Err(invalid(
            "trade_logic",
            "money_per_trade",
            "money_per_trade must be positive",
        ));
    }

    if let Some(interval) = config.get_string("trade_logic", "interval") {
        if interval.trim().is_empty() {
            return Err(invalid("trade_logic", "interval", "interval must not be empty"));
        }
    }
    Ok(())
}

pub fn validate_exit(config: &dyn ConfigPort) -> Result<(), CrosswatchError> {
    if let Some(name) = config.get_string("exit", "strategy") {
        name.parse::<ExitStrategyKind>()?;
    }
    let hold = config.get_int("exit", "simple_hold_minutes", 15);
    if hold < 0 {
        return Err(invalid(
            "exit",
            "simple_hold_minutes",
            "simple_hold_minutes must be non-negative",
        ));
    }
    let gap = config.get_int("exit", "eod_gap_minutes", 500);
    require_positive_int(config, "exit", "eod_gap_minutes", gap)?;

    for (key, default) in [
        ("target_pct", 2.0),
        ("stop_pct", 1.0),
        ("breakeven_pct", 2.0),
        ("advanced_ema_stop_pct", 1.0),
    ] {
        let value = config.get_double("exit", key, default);
        if !(0.0..100.0).contains(&value) {
            return Err(invalid("exit", key, &format!("{} must be in [0, 100)", key)));
        }
    }
    Ok(())
}

fn validate_account(config: &dyn ConfigPort) -> Result<(), CrosswatchError> {
    let value = config.get_double("account", "starting_balance", 10_000.0);
    if value <= 0.0 {
        return Err(invalid(
            "account",
            "starting_balance",
            "starting_balance must be positive",
        ));
    }
    Ok(())
}

fn validate_instruments(config: &dyn ConfigPort) -> Result<(), CrosswatchError> {
    match config.get_string("instruments", "exchange") {
        Some(s) if !s.trim().is_empty() => {}
        _ => {
            return Err(CrosswatchError::ConfigMissing {
                section: "instruments".to_string(),
                key: "exchange".to_string(),
            });
        }
    }
    match config.get_string("instruments", "codes") {
        Some(s) if s.split(',').any(|c| !c.trim().is_empty()) => Ok(()),
        _ => Err(CrosswatchError::ConfigMissing {
            section: "instruments".to_string(),
            key: "codes".to_string(),
        }),
    }
}

fn validate_replay(config: &dyn ConfigPort) -> Result<(), CrosswatchError> {
    if let Some(raw) = config.get_string("replay", "as_of") {
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(|_| {
            invalid(
                "replay",
                "as_of",
                "invalid as_of format, expected YYYY-MM-DD HH:MM:SS",
            )
        })?;
    }
    let lookback = config.get_int("replay", "lookback_days", 30);
    require_positive_int(config, "replay", "lookback_days", lookback)?;
    let horizon = config.get_int("replay", "horizon_days", 59);
    if horizon < 0 {
        return Err(invalid(
            "replay",
            "horizon_days",
            "horizon_days must be non-negative",
        ));
    }
    Ok(())
}

fn validate_live(config: &dyn ConfigPort) -> Result<(), CrosswatchError> {
    if config.get_int("live", "rounds", 0) < 0 {
        return Err(invalid("live", "rounds", "rounds must be non-negative"));
    }
    if config.get_int("live", "seconds_to_sleep", 60) < 0 {
        return Err(invalid(
            "live",
            "seconds_to_sleep",
            "seconds_to_sleep must be non-negative",
        ));
    }
    Ok(())
}

/// Integer keys that are present but unparsable fall back to their default in
/// `get_int`, so they are checked here as raw strings.
fn require_positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    value: i64,
) -> Result<(), CrosswatchError> {
    if let Some(raw) = config.get_string(section, key) {
        if raw.trim().parse::<i64>().is_err() {
            return Err(invalid(section, key, &format!("{} must be an integer", key)));
        }
    }
    if value < 1 {
        return Err(invalid(section, key, &format!("{} must be at least 1", key)));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> CrosswatchError {
    CrosswatchError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
