//! EMA-alignment + 20-day breakout trend-following strategy

use chrono::NaiveDate;

use crate::market_filter::MarketFilter;
use crate::signal_frame::SignalFrame;
use crate::strategy::Strategy;
use crate::types::{ExitReason, Money, Symbol};

pub const ATR_STOP_MULTIPLIER: f64 = 2.5;
pub const ATR_TRAILING_MULTIPLIER: f64 = 3.0;

/// Entry: EMA alignment (20 > 50 > 120) plus a close above the 20-day high.
/// Exit priority: stop loss, trailing stop, 50-EMA breakdown.
pub struct EmaBreakoutStrategy;

impl Strategy for EmaBreakoutStrategy {
    fn name(&self) -> &str {
        "ema_breakout"
    }

    fn check_market_filter(&self, date: NaiveDate, market: &MarketFilter) -> bool {
        market.is_bullish(date)
    }

    fn check_entry_signal(&self, _ticker: &Symbol, frame: &SignalFrame) -> bool {
        let (Some(ema20), Some(ema50), Some(ema120), Some(high20)) =
            (frame.ema20, frame.ema50, frame.ema120, frame.high20)
        else {
            return false;
        };
        let is_aligned = ema20 > ema50 && ema50 > ema120;
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
        if let Some(ema50) = frame.ema50 {
            if frame.close < ema50 {
                return Some(ExitReason::EmaExit);
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
