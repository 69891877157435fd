//! CLI integration tests.
//!
//! Tests cover:
//! - Settings loading from real INI files on disk
//! - Code resolution logic (resolve_codes)
//! - The validate command's exit codes
//! - The replay pipeline with MockDataPort and the CSV report writer
//! - Indicator frame CSV output

mod common;

use common::*;
use crosswatch::adapters::csv_adapter::CsvReportAdapter;
use crosswatch::cli;
use crosswatch::domain::exit::ExitStrategyKind;
use crosswatch::domain::indicator_helpers::compute_frame;
use crosswatch::domain::settings::InstrumentSettings;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn same_code(a: ExitCode, b: ExitCode) -> bool {
    format!("{a:?}") == format!("{b:?}")
}

const VALID_INI: &str = r#"
[trade_logic]
small_ema_period = 1
big_ema_period = 3
advanced_ema_period = 3
number_of_big_emas_threshold = 0
big_ema_derivative_threshold = 1000000000
ema_surface_plus_threshold = 1000000000
ema_surface_min_threshold = -1000000000
number_of_ema_crossings = 0
drop_threshold = -1000000000
support_percentage = 50

[exit]
strategy = ema

[account]
starting_balance = 25000

[data]
csv_dir = /srv/bars

[instruments]
exchange = nasdaq
codes = dip, up

[replay]
as_of = 2024-03-04 11:00:00
"#;

mod settings_loading {
    use super::*;

    #[test]
    fn load_settings_reads_every_section() {
        let file = write_temp_ini(VALID_INI);
        let settings = cli::load_settings(file.path()).unwrap();

        assert_eq!(settings.trade_logic.small_ema_period, 1);
        assert_eq!(settings.trade_logic.big_ema_period, 3);
        assert_eq!(settings.exit.strategy, ExitStrategyKind::Ema);
        assert!((settings.account.starting_balance - 25_000.0).abs() < f64::EPSILON);
        assert_eq!(settings.csv_dir, Some(PathBuf::from("/srv/bars")));
        assert_eq!(settings.instruments.exchange, "NASDAQ");
        assert_eq!(settings.instruments.codes, vec!["DIP", "UP"]);
        assert_eq!(settings.replay.as_of, Some(session_start() + chrono::Duration::minutes(90)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let code = cli::load_settings(&PathBuf::from("/nonexistent/path/config.ini")).unwrap_err();
        assert!(same_code(code, ExitCode::from(2)));
    }
}

mod code_resolution {
    use super::*;

    fn instruments() -> InstrumentSettings {
        InstrumentSettings {
            exchange: "NASDAQ".into(),
            codes: vec!["AAPL".into(), "MSFT".into()],
        }
    }

    #[test]
    fn override_takes_precedence() {
        assert_eq!(cli::resolve_codes(Some(" ibm "), &instruments()), vec!["IBM"]);
    }

    #[test]
    fn falls_back_to_configured_codes() {
        assert_eq!(cli::resolve_codes(None, &instruments()), vec!["AAPL", "MSFT"]);
        assert_eq!(cli::resolve_codes(Some("  "), &instruments()), vec!["AAPL", "MSFT"]);
    }
}

mod validate_command {
    use super::*;

    #[test]
    fn valid_config_succeeds() {
        let file = write_temp_ini(VALID_INI);
        let code = cli::run_validate(file.path());
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn unknown_exit_strategy_fails_with_config_code() {
        let ini = VALID_INI.replace("strategy = ema", "strategy = trailing");
        let file = write_temp_ini(&ini);
        let code = cli::run_validate(file.path());
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn missing_codes_fails() {
        let ini = VALID_INI.replace("codes = dip, up", "");
        let file = write_temp_ini(&ini);
        let code = cli::run_validate(file.path());
        assert!(same_code(code, ExitCode::from(2)));
    }
}

mod replay_pipeline {
    use super::*;

    #[test]
    fn writes_one_row_per_instrument() {
        let file = write_temp_ini(VALID_INI);
        let settings = cli::load_settings(file.path()).unwrap();
        let dip = bars_from_closes(&[10.0, 10.0, 10.0, 10.0, 9.0, 9.5, 12.0, 12.0]);
        let up = bars_from_closes(&[10.0, 10.0, 10.0, 11.0, 12.0, 13.0, 14.0]);
        let mock = MockDataPort::new().with_bars("DIP", dip).with_bars("UP", up);

        let temp_dir = tempfile::TempDir::new().unwrap();
        let output = temp_dir.path().join("replay.csv");
        let summary = cli::run_replay_pipeline(
            &mock,
            &settings,
            settings.replay.as_of.unwrap(),
            &CsvReportAdapter::new(output.clone()),
        )
        .unwrap();

        assert_eq!(summary.instruments, 2);
        assert_eq!(summary.bought_and_sold, 1);
        assert_eq!(summary.never_bought, 1);

        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("instrument,exchange,as_of,outcome"));
        assert!(content.contains("bought_and_sold"));
        assert!(content.contains("never_bought"));
    }

    #[test]
    fn no_replayable_instrument_is_an_error() {
        let file = write_temp_ini(VALID_INI);
        let settings = cli::load_settings(file.path()).unwrap();
        let mock = MockDataPort::new().with_error("DIP", "timeout");

        let temp_dir = tempfile::TempDir::new().unwrap();
        let output = temp_dir.path().join("replay.csv");
        let result = cli::run_replay_pipeline(
            &mock,
            &settings,
            settings.replay.as_of.unwrap(),
            &CsvReportAdapter::new(output.clone()),
        );

        assert!(result.is_err());
        assert!(!output.exists());
    }
}

mod indicator_output {
    use super::*;

    #[test]
    fn frame_csv_has_one_row_per_bar() {
        let file = write_temp_ini(VALID_INI);
        let settings = cli::load_settings(file.path()).unwrap();
        let bars = bars_from_closes(&[10.0, 10.0, 10.0, 10.0, 12.0, 11.0]);
        let frame = compute_frame(&bars, &settings.trade_logic.frame_spec(true)).unwrap();

        let mut out = Vec::new();
        cli::write_frame_csv(&frame, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 7);
        assert_eq!(
            lines[0],
            "timestamp,close,small_ema,big_ema,advanced_ema,sar,slow_k,macd,macd_signal,rsi"
        );
        assert!(lines[1].starts_with("2024-03-04T09:30:00,10.0,,,"));
        assert!(lines[5].starts_with("2024-03-04T11:30:00,12.0,12.0,11.0,11.0,"));
    }
}
