//! Engine configuration
//!
//! Every tunable named by the backtest engine, loadable from a JSON file or
//! built up with the same `with_*` builder idiom as [`crate::risk::RiskManagerConfig`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::Symbol;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub tickers: Vec<String>,
    pub market_indices: Vec<String>,
    pub initial_capital: f64,

    pub base_risk_pct: f64,
    pub reduced_risk_pct: f64,
    pub max_portfolio_risk: f64,
    pub consecutive_loss_trigger: u32,
    pub drawdown_trigger: f64,
    pub reduced_trades_count: u32,
    pub recovery_r_threshold: f64,
    pub recovery_wins_threshold: u32,

    /// Drawdown from peak equity at or above which new entries are blocked
    /// entirely (distinct from the risk manager's reduction trigger).
    pub drawdown_entry_block: f64,

    /// Losses within the trailing window that arm the kill switch.
    pub kill_switch_loss_count: u32,
    /// Size of the trailing trade-outcome window.
    pub kill_switch_window: u32,
    /// Trading days the kill switch halts new entries once armed.
    pub kill_switch_cooldown_days: i64,

    pub data_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tickers: Vec::new(),
            market_indices: vec!["KS11".to_string(), "KQ11".to_string()],
            initial_capital: 100_000_000.0,
            base_risk_pct: crate::risk::DEFAULT_RISK_PCT,
            reduced_risk_pct: crate::risk::REDUCED_RISK_PCT,
            max_portfolio_risk: crate::risk::MAX_PORTFOLIO_RISK,
            consecutive_loss_trigger: crate::risk::CONSECUTIVE_LOSS_TRIGGER,
            drawdown_trigger: crate::risk::DRAWDOWN_TRIGGER,
            reduced_trades_count: crate::risk::REDUCED_TRADES_COUNT,
            recovery_r_threshold: crate::risk::RECOVERY_R_THRESHOLD,
            recovery_wins_threshold: crate::risk::RECOVERY_WINS_THRESHOLD,
            drawdown_entry_block: 0.15,
            kill_switch_loss_count: 8,
            kill_switch_window: 10,
            kill_switch_cooldown_days: 20,
            data_dir: "data".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        serde_json::from_str(&contents).context("failed to parse config JSON")
    }

    pub fn with_initial_capital(mut self, capital: f64) -> Self {
        self.initial_capital = capital;
        self
    }

    pub fn with_tickers(mut self, tickers: Vec<String>) -> Self {
        self.tickers = tickers;
        self
    }

    pub fn with_kill_switch(mut self, loss_count: u32, window: u32, cooldown_days: i64) -> Self {
        self.kill_switch_loss_count = loss_count;
        self.kill_switch_window = window;
        self.kill_switch_cooldown_days = cooldown_days;
        self
    }

    pub fn tickers(&self) -> Vec<Symbol> {
        self.tickers.iter().map(Symbol::new).collect()
    }

    pub fn market_indices(&self) -> Vec<Symbol> {
        self.market_indices.iter().map(Symbol::new).collect()
    }

    pub fn risk_manager_config(&self) -> crate::risk::RiskManagerConfig {
        crate::risk::RiskManagerConfig::default()
            .with_base_risk_pct(self.base_risk_pct)
            .with_reduced_risk_pct(self.reduced_risk_pct)
            .with_max_portfolio_risk(self.max_portfolio_risk)
            .with_reduction_triggers(self.consecutive_loss_trigger, self.drawdown_trigger)
            .with_recovery_conditions(self.reduced_trades_count, self.recovery_r_threshold, self.recovery_wins_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_documented_risk_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.base_risk_pct, 0.01);
        assert_eq!(config.max_portfolio_risk, 0.04);
        assert_eq!(config.kill_switch_loss_count, 8);
    }

    #[test]
    fn test_roundtrip_json() {
        let config = EngineConfig::default().with_initial_capital(50_000.0);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.initial_capital, 50_000.0);
    }
}
