//! Core domain types and logic.

pub mod acceptance;
pub mod calendar;
pub mod config_validation;
pub mod crossover;
pub mod decision;
pub mod error;
pub mod execution;
pub mod exit;
pub mod indicator;
pub mod indicator_helpers;
pub mod ledger;
pub mod live;
pub mod metrics;
pub mod ohlcv;
pub mod position;
pub mod replay;
pub mod settings;
