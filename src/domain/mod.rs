//! Core domain types and logic.

pub mod ohlcv;
pub mod validation;
pub mod repair;
pub mod indicator;
pub mod strategy;
pub mod order;
pub mod execution;
pub mod position;
pub mod ledger;
pub mod backtest;
pub mod metrics;
pub mod pipeline;
pub mod sweep;
pub mod metadata;
pub mod config_validation;
pub mod error;
