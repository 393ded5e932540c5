//! Risk management: position sizing plus a reduced/recovery state machine
//!
//! # Currency-agnostic design
//!
//! Position sizing is dimensionless: `shares = (capital * risk_pct) /
//! (entry_price - stop_loss)`. This holds regardless of the currency
//! `capital` and prices are denominated in, so long as they agree.

use tracing::info;

use crate::types::Money;

pub const DEFAULT_RISK_PCT: f64 = 0.01;
pub const REDUCED_RISK_PCT: f64 = 0.005;
pub const MAX_PORTFOLIO_RISK: f64 = 0.04;

pub const CONSECUTIVE_LOSS_TRIGGER: u32 = 3;
pub const DRAWDOWN_TRIGGER: f64 = 0.07;

pub const REDUCED_TRADES_COUNT: u32 = 3;
pub const RECOVERY_R_THRESHOLD: f64 = 2.0;
pub const RECOVERY_WINS_THRESHOLD: u32 = 2;

/// Configuration for [`RiskManager`], built via the same with_*/Default pattern.
#[derive(Debug, Clone)]
pub struct RiskManagerConfig {
    pub base_risk_pct: f64,
    pub max_portfolio_risk: f64,
    pub reduced_risk_pct: f64,
    pub consecutive_loss_trigger: u32,
    pub drawdown_trigger: f64,
    pub reduced_trades_count: u32,
    pub recovery_r_threshold: f64,
    pub recovery_wins_threshold: u32,
}

impl Default for RiskManagerConfig {
    fn default() -> Self {
        Self {
            base_risk_pct: DEFAULT_RISK_PCT,
            max_portfolio_risk: MAX_PORTFOLIO_RISK,
            reduced_risk_pct: REDUCED_RISK_PCT,
            consecutive_loss_trigger: CONSECUTIVE_LOSS_TRIGGER,
            drawdown_trigger: DRAWDOWN_TRIGGER,
            reduced_trades_count: REDUCED_TRADES_COUNT,
            recovery_r_threshold: RECOVERY_R_THRESHOLD,
            recovery_wins_threshold: RECOVERY_WINS_THRESHOLD,
        }
    }
}

impl RiskManagerConfig {
    pub fn with_base_risk_pct(mut self, pct: f64) -> Self {
        self.base_risk_pct = pct;
        self
    }

    pub fn with_max_portfolio_risk(mut self, pct: f64) -> Self {
        self.max_portfolio_risk = pct;
        self
    }

    pub fn with_reduced_risk_pct(mut self, pct: f64) -> Self {
        self.reduced_risk_pct = pct;
        self
    }

    pub fn with_reduction_triggers(mut self, consecutive_losses: u32, drawdown: f64) -> Self {
        self.consecutive_loss_trigger = consecutive_losses;
        self.drawdown_trigger = drawdown;
        self
    }

    pub fn with_recovery_conditions(mut self, trades_count: u32, r_threshold: f64, wins_threshold: u32) -> Self {
        self.reduced_trades_count = trades_count;
        self.recovery_r_threshold = r_threshold;
        self.recovery_wins_threshold = wins_threshold;
        self
    }
}

/// Mutable risk state tracked across a backtest session.
#[derive(Debug, Clone, Default)]
pub struct RiskState {
    pub consecutive_losses: u32,
    pub peak_equity: Money,
    pub is_reduced: bool,
    pub reduced_trades_remaining: u32,
    pub winning_exits_since_reduction: u32,
    pub r_gained_since_reduction: f64,
}

/// Sizes positions and runs the reduced/recovery risk-mode state machine.
pub struct RiskManager {
    config: RiskManagerConfig,
    pub state: RiskState,
}

impl RiskManager {
    pub fn new(config: RiskManagerConfig) -> Self {
        Self {
            config,
            state: RiskState::default(),
        }
    }

    pub fn current_risk_pct(&self) -> f64 {
        if self.state.is_reduced {
            self.config.reduced_risk_pct
        } else {
            self.config.base_risk_pct
        }
    }

    pub fn update_peak_equity(&mut self, equity: Money) {
        if equity > self.state.peak_equity {
            self.state.peak_equity = equity;
        }
    }

    /// Drawdown from peak equity, `0.0` if no peak has been recorded yet.
    pub fn check_drawdown(&self, current_equity: Money) -> f64 {
        if self.state.peak_equity.is_zero() {
            return 0.0;
        }
        ((self.state.peak_equity - current_equity) / self.state.peak_equity).to_f64()
    }

    pub fn can_take_risk(&self, current_portfolio_risk_pct: f64, new_position_risk_pct: f64) -> bool {
        current_portfolio_risk_pct + new_position_risk_pct <= self.config.max_portfolio_risk
    }

    pub fn calculate_position_size(&self, capital: Money, entry_price: Money, stop_loss: Money) -> u64 {
        if entry_price <= stop_loss {
            return 0;
        }
        let risk_per_share = (entry_price - stop_loss).to_f64();
        let risk_amount = capital.to_f64() * self.current_risk_pct();
        (risk_amount / risk_per_share).floor().max(0.0) as u64
    }

    /// Called once a trade has fully closed: updates consecutive-loss and
    /// R-recovery counters, then checks reduction and recovery in that order.
    pub fn on_trade_exit(&mut self, is_stop_loss: bool, r_multiple: f64, current_equity: Money) {
        if is_stop_loss {
            self.state.consecutive_losses += 1;
            if self.state.is_reduced {
                self.state.r_gained_since_reduction += r_multiple;
            }
        } else {
            self.state.consecutive_losses = 0;
            if self.state.is_reduced {
                self.state.winning_exits_since_reduction += 1;
                self.state.r_gained_since_reduction += r_multiple;
            }
        }

        if self.state.is_reduced && self.state.reduced_trades_remaining > 0 {
            self.state.reduced_trades_remaining -= 1;
        }

        self.check_reduction_trigger(current_equity);
        self.check_recovery();
    }

    fn check_reduction_trigger(&mut self, current_equity: Money) {
        if self.state.is_reduced {
            return;
        }

        if self.state.consecutive_losses >= self.config.consecutive_loss_trigger {
            self.activate_reduction("consecutive losses");
            return;
        }

        let drawdown = self.check_drawdown(current_equity);
        if drawdown >= self.config.drawdown_trigger {
            self.activate_reduction("drawdown");
        }
    }

    fn activate_reduction(&mut self, reason: &str) {
        self.state.is_reduced = true;
        self.state.reduced_trades_remaining = self.config.reduced_trades_count;
        self.state.winning_exits_since_reduction = 0;
        self.state.r_gained_since_reduction = 0.0;
        info!(
            reason,
            reduced_risk_pct = self.config.reduced_risk_pct,
            next_trades = self.config.reduced_trades_count,
            "risk reduction activated"
        );
    }

    fn check_recovery(&mut self) {
        if !self.state.is_reduced {
            return;
        }

        if self.state.r_gained_since_reduction >= self.config.recovery_r_threshold {
            self.deactivate_reduction("r_recovery");
            return;
        }
        if self.state.winning_exits_since_reduction >= self.config.recovery_wins_threshold {
            self.deactivate_reduction("wins_recovery");
            return;
        }
        if self.state.reduced_trades_remaining == 0 {
            self.deactivate_reduction("trades_exhausted");
        }
    }

    fn deactivate_reduction(&mut self, reason: &str) {
        self.state.is_reduced = false;
        self.state.consecutive_losses = 0;
        info!(reason, base_risk_pct = self.config.base_risk_pct, "risk reduction lifted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduction_triggers_after_three_consecutive_losses() {
        let mut rm = RiskManager::new(RiskManagerConfig::default());
        rm.update_peak_equity(Money::from_f64(100_000.0));
        rm.on_trade_exit(true, -1.0, Money::from_f64(99_000.0));
        rm.on_trade_exit(true, -1.0, Money::from_f64(98_000.0));
        assert!(!rm.state.is_reduced);
        rm.on_trade_exit(true, -1.0, Money::from_f64(97_000.0));
        assert!(rm.state.is_reduced);
        assert_eq!(rm.current_risk_pct(), REDUCED_RISK_PCT);
    }

    #[test]
    fn test_recovery_by_r_gain() {
        let mut rm = RiskManager::new(RiskManagerConfig::default());
        rm.update_peak_equity(Money::from_f64(100_000.0));
        rm.on_trade_exit(true, -1.0, Money::from_f64(99_000.0));
        rm.on_trade_exit(true, -1.0, Money::from_f64(98_000.0));
        rm.on_trade_exit(true, -1.0, Money::from_f64(93_000.0));
        assert!(rm.state.is_reduced);

        rm.on_trade_exit(false, 2.5, Money::from_f64(94_000.0));
        assert!(!rm.state.is_reduced);
        assert_eq!(rm.current_risk_pct(), DEFAULT_RISK_PCT);
    }

    #[test]
    fn test_drawdown_trigger_without_consecutive_losses() {
        let mut rm = RiskManager::new(RiskManagerConfig::default());
        rm.update_peak_equity(Money::from_f64(100_000.0));
        // single stop-loss exit that happens to coincide with a 7%+ drawdown
        rm.on_trade_exit(true, -1.0, Money::from_f64(92_000.0));
        assert!(rm.state.is_reduced);
    }

    #[test]
    fn test_position_size_zero_when_stop_above_entry() {
        let rm = RiskManager::new(RiskManagerConfig::default());
        let size = rm.calculate_position_size(Money::from_f64(100_000.0), Money::from_f64(100.0), Money::from_f64(105.0));
        assert_eq!(size, 0);
    }

    #[test]
    fn test_can_take_risk_respects_portfolio_cap() {
        let rm = RiskManager::new(RiskManagerConfig::default());
        assert!(rm.can_take_risk(0.02, 0.01));
        assert!(!rm.can_take_risk(0.035, 0.01));
    }
}
