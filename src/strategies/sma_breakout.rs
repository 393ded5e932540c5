//! SMA-alignment + 20-day breakout trend-following strategy

use chrono::NaiveDate;

use crate::market_filter::MarketFilter;
use crate::signal_frame::SignalFrame;
use crate::strategy::Strategy;
use crate::types::{ExitReason, Money, Symbol};

pub const ATR_STOP_MULTIPLIER: f64 = 2.5;
pub const ATR_TRAILING_MULTIPLIER: f64 = 3.0;

/// Entry: SMA alignment (20 > 60 > 120) plus a close above the 20-day high.
/// Exit priority: stop loss, trailing stop, 60-day MA breakdown.
pub struct SmaBreakoutStrategy;

impl Strategy for SmaBreakoutStrategy {
    fn name(&self) -> &str {
        "sma_breakout"
    }

    fn check_market_filter(&self, date: NaiveDate, market: &MarketFilter) -> bool {
        market.is_bullish(date)
    }

    fn check_entry_signal(&self, _ticker: &Symbol, frame: &SignalFrame) -> bool {
        let (Some(ma20), Some(ma60), Some(ma120), Some(high20)) = (frame.ma20, frame.ma60, frame.ma120, frame.high20)
        else {
            return false;
        };
        let is_aligned = ma20 > ma60 && ma60 > ma120;
        let is_breakout = frame.close > high20;
        is_aligned && is_breakout
    }

    fn check_exit_signal(
        &self,
        _ticker: &Symbol,
        frame: &SignalFrame,
        _entry_price: Money,
        _entry_date: NaiveDate,
        highest_close: Money,
        initial_stop: Money,
    ) -> Option<ExitReason> {
        if Money::from_f64(frame.close) <= initial_stop {
            return Some(ExitReason::StopLoss);
        }
        if let Some(atr20) = frame.atr20 {
            let trailing_stop = highest_close - Money::from_f64(atr20 * ATR_TRAILING_MULTIPLIER);
            if Money::from_f64(frame.close) <= trailing_stop {
                return Some(ExitReason::TrailingStop);
            }
        }
        if let Some(ma60) = frame.ma60 {
            if frame.close < ma60 {
                return Some(ExitReason::MaExit);
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

    fn frame(close: f64, ma20: f64, ma60: f64, ma120: f64, high20: f64) -> SignalFrame {
        SignalFrame {
            date: NaiveDate::parse_from_str("2024-03-01", "%Y-%m-%d").unwrap(),
            close,
            ma20: Some(ma20),
            ma60: Some(ma60),
            ma120: Some(ma120),
            high20: Some(high20),
            ..Default::default()
        }
    }

    #[test]
    fn test_entry_requires_alignment_and_breakout() {
        let strategy = SmaBreakoutStrategy;
        let ticker = Symbol::new("005930");
        let aligned_breakout = frame(110.0, 100.0, 90.0, 80.0, 105.0);
        assert!(strategy.check_entry_signal(&ticker, &aligned_breakout));

        let not_aligned = frame(110.0, 90.0, 100.0, 80.0, 105.0);
        assert!(!strategy.check_entry_signal(&ticker, &not_aligned));

        let no_breakout = frame(100.0, 100.0, 90.0, 80.0, 105.0);
        assert!(!strategy.check_entry_signal(&ticker, &no_breakout));
    }

    #[test]
    fn test_exit_priority_stop_before_trailing() {
        let strategy = SmaBreakoutStrategy;
        let ticker = Symbol::new("005930");
        let f = SignalFrame {
            close: 90.0,
            atr20: Some(2.0),
            ..frame(90.0, 100.0, 90.0, 80.0, 105.0)
        };
        let reason = strategy
            .check_exit_signal(&ticker, &f, Money::from_f64(100.0), f.date, Money::from_f64(120.0), Money::from_f64(95.0))
            .unwrap();
        assert_eq!(reason, ExitReason::StopLoss);
    }
}
