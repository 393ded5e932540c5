//! Event-driven equity backtesting engine
//!
//! Simulates a strategy bar-by-bar over historical daily candles, enforcing
//! the same entry/exit/risk rules a live trading desk would apply, and
//! reports the resulting trades, equity curve, and summary statistics.

pub mod candle_store;
pub mod config;
pub mod engine;
pub mod indicators;
pub mod market_filter;
pub mod portfolio;
pub mod risk;
pub mod signal_frame;
pub mod strategy;
pub mod strategies;
pub mod trade_repository;
pub mod types;

pub use config::EngineConfig;
pub use engine::{BacktestEngine, SessionResult, SessionStats};
pub use types::*;
