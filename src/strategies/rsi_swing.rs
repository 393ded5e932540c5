//! RSI pullback swing strategy
//!
//! Buys a temporary oversold dip within an intact medium-term uptrend,
//! targets a quick reversion, and force-exits on a holding-period timeout
//! regardless of how the trade is doing.

use chrono::NaiveDate;

use crate::signal_frame::SignalFrame;
use crate::strategy::Strategy;
use crate::types::{ExitReason, Money, Symbol};

pub const RSI_ENTRY_THRESHOLD: f64 = 45.0;
pub const RSI_EXIT_THRESHOLD: f64 = 70.0;
pub const MAX_HOLDING_DAYS: i64 = 10;
pub const ATR_STOP_MULTIPLIER: f64 = 2.5;

pub struct RsiSwingStrategy;

impl Strategy for RsiSwingStrategy {
    fn name(&self) -> &str {
        "rsi_swing"
    }

    fn check_entry_signal(&self, _ticker: &Symbol, frame: &SignalFrame) -> bool {
        let (Some(ma60), Some(rsi14)) = (frame.ma60, frame.rsi14) else {
            return false;
        };
        let is_uptrend = frame.close > ma60;
        let is_pullback = rsi14 < RSI_ENTRY_THRESHOLD;
        is_uptrend && is_pullback
    }

    fn check_exit_signal(
        &self,
        _ticker: &Symbol,
        frame: &SignalFrame,
        _entry_price: Money,
        entry_date: NaiveDate,
        _highest_close: Money,
        initial_stop: Money,
    ) -> Option<ExitReason> {
        if Money::from_f64(frame.close) <= initial_stop {
            return Some(ExitReason::StopLoss);
        }
        // Calendar days held, matching the original's holding-period rule.
        let days_held = (frame.date - entry_date).num_days();
        if days_held >= MAX_HOLDING_DAYS {
            return Some(ExitReason::TimeExit);
        }
        if let Some(rsi14) = frame.rsi14 {
            if rsi14 > RSI_EXIT_THRESHOLD {
                return Some(ExitReason::RsiTarget);
            }
        }
        None
    }

    fn calculate_stop_loss(&self, entry_price: Money, atr: f64) -> Money {
        entry_price - Money::from_f64(atr * ATR_STOP_MULTIPLIER)
    }

    fn re_entry_cooldown_days(&self) -> i64 {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_requires_uptrend_and_pullback() {
        let strategy = RsiSwingStrategy;
        let ticker = Symbol::new("051910");
        let date = NaiveDate::parse_from_str("2024-06-01", "%Y-%m-%d").unwrap();
        let good = SignalFrame { date, close: 110.0, ma60: Some(100.0), rsi14: Some(40.0), ..Default::default() };
        assert!(strategy.check_entry_signal(&ticker, &good));

        let no_uptrend = SignalFrame { close: 90.0, ..good };
        assert!(!strategy.check_entry_signal(&ticker, &no_uptrend));
    }

    #[test]
    fn test_time_exit_after_max_holding_days() {
        let strategy = RsiSwingStrategy;
        let ticker = Symbol::new("051910");
        let entry_date = NaiveDate::parse_from_str("2024-06-01", "%Y-%m-%d").unwrap();
        let later = entry_date + chrono::Duration::days(10);
        let f = SignalFrame { date: later, close: 105.0, rsi14: Some(50.0), ..Default::default() };
        let reason = strategy
            .check_exit_signal(&ticker, &f, Money::from_f64(100.0), entry_date, Money::from_f64(100.0), Money::from_f64(90.0))
            .unwrap();
        assert_eq!(reason, ExitReason::TimeExit);
    }

    #[test]
    fn test_rsi_target_exit() {
        let strategy = RsiSwingStrategy;
        let ticker = Symbol::new("051910");
        let entry_date = NaiveDate::parse_from_str("2024-06-01", "%Y-%m-%d").unwrap();
        let f = SignalFrame { date: entry_date + chrono::Duration::days(2), close: 108.0, rsi14: Some(75.0), ..Default::default() };
        let reason = strategy
            .check_exit_signal(&ticker, &f, Money::from_f64(100.0), entry_date, Money::from_f64(108.0), Money::from_f64(90.0))
            .unwrap();
        assert_eq!(reason, ExitReason::RsiTarget);
    }
}
