//! CSV adapters: bar files in, trade records and replay rows out.

use crate::domain::error::CrosswatchError;
use crate::domain::ohlcv::Bar;
use crate::domain::position::{ExitReason, TradeRecord};
use crate::domain::replay::ReplayRow;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportPort, TradeSink};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Reads `<base_path>/<INSTRUMENT>.csv` with the header
/// `timestamp,open,high,low,close,volume`. Files hold a single interval, so
/// the requested interval is not checked.
pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", instrument))
    }
}

/// Date-only values are read as midnight.
fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, CrosswatchError> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| CrosswatchError::DataSource {
            reason: format!("invalid timestamp '{}'", raw),
        })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        instrument: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        _interval: &str,
    ) -> Result<Vec<Bar>, CrosswatchError> {
        let path = self.csv_path(instrument);
        let content = fs::read_to_string(&path).map_err(|e| CrosswatchError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.deserialize::<BarRow>() {
            let row = result.map_err(|e| CrosswatchError::DataSource {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let timestamp = parse_timestamp(&row.timestamp)?;
            if timestamp < start || timestamp > end {
                continue;
            }
            bars.push(Bar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

/// One flat CSV row per closed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRow {
    pub instrument: String,
    pub exchange: String,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub quantity: f64,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_price: f64,
    pub legs: usize,
    pub result: f64,
    pub return_pct: f64,
    pub reason: ExitReason,
    pub entry_small_ema: Option<f64>,
    pub entry_big_ema: Option<f64>,
    pub entry_sar: Option<f64>,
    pub entry_slow_k: Option<f64>,
    pub entry_fast_k: Option<f64>,
    pub entry_macd: Option<f64>,
    pub entry_macd_signal: Option<f64>,
    pub entry_rsi: Option<f64>,
}

impl From<&TradeRecord> for TradeRow {
    fn from(record: &TradeRecord) -> Self {
        let snap = &record.entry_snapshot;
        TradeRow {
            instrument: record.instrument.clone(),
            exchange: record.exchange.clone(),
            entry_time: record.entry_time,
            entry_price: record.entry_price,
            quantity: record.quantity.as_f64(),
            exit_time: record.exit_time(),
            exit_price: record.average_exit_price(),
            legs: record.legs.len(),
            result: record.realized_pnl,
            return_pct: record.return_pct(),
            reason: record.reason,
            entry_small_ema: snap.small_ema,
            entry_big_ema: snap.big_ema,
            entry_sar: snap.sar,
            entry_slow_k: snap.slow_k,
            entry_fast_k: snap.fast_k,
            entry_macd: snap.macd_line,
            entry_macd_signal: snap.macd_signal,
            entry_rsi: snap.rsi,
        }
    }
}

/// Appends one row per closed trade; the header is written when the file is
/// new or empty.
pub struct CsvTradeSink {
    path: PathBuf,
    // Serializes appends from concurrent callers.
    guard: Mutex<()>,
}

impl CsvTradeSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
        }
    }
}

impl TradeSink for CsvTradeSink {
    fn push(&self, record: &TradeRecord) -> Result<(), CrosswatchError> {
        let _lock = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        let write_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        wtr.serialize(TradeRow::from(record))
            .map_err(|e| CrosswatchError::Export {
                reason: format!("failed to write trade to {}: {}", self.path.display(), e),
            })?;
        wtr.flush()?;
        Ok(())
    }
}

/// Writes replay rows to a fresh CSV file.
pub struct CsvReportAdapter {
    path: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_replay(&self, rows: &[ReplayRow]) -> Result<(), CrosswatchError> {
        let mut wtr = csv::Writer::from_path(&self.path).map_err(|e| CrosswatchError::Export {
            reason: format!("failed to create {}: {}", self.path.display(), e),
        })?;
        for row in rows {
            wtr.serialize(row).map_err(|e| CrosswatchError::Export {
                reason: format!("failed to write replay row: {}", e),
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}
