//! JSON file adapters for the command channel and the state snapshot.

use crate::domain::error::CrosswatchError;
use crate::domain::live::{Command, InstrumentSnapshot};
use crate::ports::command_port::CommandPort;
use crate::ports::report_port::SnapshotPort;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

const SELL_EVERYTHING: &str = "ALLSTOCKS";
const STOP: &str = "STOPALGORITHM";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CommandFile {
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    tickers_to_sell: Vec<String>,
    #[serde(default)]
    tickers_to_buy: Vec<String>,
    #[serde(default)]
    tickers_to_stop_monitor: Vec<String>,
}

impl CommandFile {
    fn is_empty(&self) -> bool {
        self.commands.is_empty()
            && self.tickers_to_sell.is_empty()
            && self.tickers_to_buy.is_empty()
            && self.tickers_to_stop_monitor.is_empty()
    }

    fn into_commands(self) -> Vec<Command> {
        let mut out = Vec::new();
        for raw in self.commands {
            match raw.trim().to_uppercase().as_str() {
                STOP => out.push(Command::Stop),
                other => warn!(command = other, "ignoring unknown command"),
            }
        }
        for raw in self.tickers_to_sell {
            let code = raw.trim().to_uppercase();
            if code == SELL_EVERYTHING {
                out.push(Command::ForceSellAll);
            } else if !code.is_empty() {
                out.push(Command::ForceSell(code));
            }
        }
        for raw in self.tickers_to_buy {
            let code = raw.trim().to_uppercase();
            if !code.is_empty() {
                out.push(Command::ForceBuy(code));
            }
        }
        for raw in self.tickers_to_stop_monitor {
            let code = raw.trim().to_uppercase();
            if !code.is_empty() {
                out.push(Command::StopMonitor(code));
            }
        }
        out
    }
}

/// Command channel backed by a JSON file that an operator edits. Consumed
/// entries are cleared by rewriting the file empty. A missing file means no
/// commands.
pub struct JsonCommandFile {
    path: PathBuf,
}

impl JsonCommandFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CommandPort for JsonCommandFile {
    fn poll(&self) -> Result<Vec<Command>, CrosswatchError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: CommandFile =
            serde_json::from_str(&content).map_err(|e| CrosswatchError::DataSource {
                reason: format!("invalid command file {}: {}", self.path.display(), e),
            })?;
        if file.is_empty() {
            return Ok(Vec::new());
        }

        let cleared = serde_json::to_string_pretty(&CommandFile::default()).map_err(|e| {
            CrosswatchError::Export {
                reason: format!("failed to serialize command file: {}", e),
            }
        })?;
        fs::write(&self.path, cleared)?;
        Ok(file.into_commands())
    }
}

/// Overwrites a JSON file with the latest snapshot.
pub struct JsonSnapshotFile {
    path: PathBuf,
}

impl JsonSnapshotFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SnapshotPort for JsonSnapshotFile {
    fn write_snapshot(&self, snapshot: &[InstrumentSnapshot]) -> Result<(), CrosswatchError> {
        let json = serde_json::to_string_pretty(snapshot).map_err(|e| CrosswatchError::Export {
            reason: format!("failed to serialize snapshot: {}", e),
        })?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn missing_file_means_no_commands() {
        let dir = TempDir::new().unwrap();
        let port = JsonCommandFile::new(dir.path().join("commands.json"));
        assert!(port.poll().unwrap().is_empty());
    }

    #[test]
    fn poll_maps_and_clears_commands() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("commands.json");
        fs::write(
            &path,
            r#"{"commands": ["StopAlgorithm", "dance"],
                "tickers_to_sell": ["ibm", "ALLSTOCKS"],
                "tickers_to_buy": [" ge "],
                "tickers_to_stop_monitor": ["msft", ""]}"#,
        )
        .unwrap();
        let port = JsonCommandFile::new(path.clone());

        let commands = port.poll().unwrap();
        assert_eq!(
            commands,
            vec![
                Command::Stop,
                Command::ForceSell("IBM".into()),
                Command::ForceSellAll,
                Command::ForceBuy("GE".into()),
                Command::StopMonitor("MSFT".into()),
            ]
        );

        // Each command is delivered once.
        assert!(port.poll().unwrap().is_empty());
        let cleared: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(cleared["tickers_to_sell"], serde_json::json!([]));
        assert_eq!(cleared["tickers_to_stop_monitor"], serde_json::json!([]));
    }

    #[test]
    fn partial_file_uses_empty_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("commands.json");
        fs::write(&path, r#"{"tickers_to_buy": ["AAPL"]}"#).unwrap();
        let port = JsonCommandFile::new(path);
        assert_eq!(port.poll().unwrap(), vec![Command::ForceBuy("AAPL".into())]);
    }

    #[test]
    fn malformed_file_is_data_source_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("commands.json");
        fs::write(&path, "{not json").unwrap();
        let err = JsonCommandFile::new(path).poll().unwrap_err();
        assert!(matches!(err, CrosswatchError::DataSource { .. }));
    }

    #[test]
    fn snapshot_written_as_json_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let port = JsonSnapshotFile::new(path.clone());
        let at = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let snap = InstrumentSnapshot {
            instrument: "AAPL".into(),
            exchange: "NASDAQ".into(),
            monitored: true,
            held: true,
            quantity: Some(4.9),
            entry_price: Some(101.0),
            entry_time: Some(at),
            current_value: Some(102.5),
            virtual_result: Some(7.35),
            support_level: Some(90.0),
            last_data_time: Some(at),
        };

        port.write_snapshot(&[snap]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["instrument"], "AAPL");
        assert_eq!(value[0]["held"], true);
        assert_eq!(value[0]["quantity"], 4.9);
        assert_eq!(value[0]["entry_time"], "2024-03-04T10:00:00");
    }
}
