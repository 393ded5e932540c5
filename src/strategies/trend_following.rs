//! Trend-following breakout strategy with pyramiding
//!
//! The only reference strategy that adds to a winner: once a position's
//! favorable excursion clears 1R, it can size up again against the same
//! trend, subject to the engine's open-risk cap.

use chrono::NaiveDate;

use crate::market_filter::MarketFilter;
use crate::signal_frame::SignalFrame;
use crate::strategy::{PyramidContext, Strategy};
use crate::types::{ExitReason, Money, Symbol};

pub const ATR_STOP_MULTIPLIER: f64 = 2.0;
pub const ATR_TRAILING_MULTIPLIER: f64 = 2.5;
pub const EMA_SLOPE_ENTRY_THRESHOLD: f64 = -0.2;
pub const EMA_SLOPE_EXIT_THRESHOLD: f64 = -0.3;
/// Overheat guard: skip entries when ATR20/close exceeds this ratio. This
/// matches the strategy's own executable threshold, not the looser figure
/// sometimes quoted for it elsewhere.
pub const ATR_OVERHEAT_THRESHOLD: f64 = 0.08;

/// Pyramid add-on trigger: minimum favorable excursion, in R, before a
/// second entry is considered.
pub const PYRAMID_MIN_MFE_R: f64 = 1.0;
/// Pyramid risk cap, in R, across base + all add-ons for one ticker.
pub const PYRAMID_MAX_OPEN_RISK_R: f64 = 2.0;
/// Per-add-on risk budget, in R.
pub const PYRAMID_ADD_ON_RISK_R: f64 = 0.5;

pub struct TrendFollowingStrategy;

impl Strategy for TrendFollowingStrategy {
    fn name(&self) -> &str {
        "trend_following"
    }

    fn check_market_filter(&self, date: NaiveDate, market: &MarketFilter) -> bool {
        market.is_bullish(date) && market.is_structure_ok(date)
    }

    fn check_entry_signal(&self, _ticker: &Symbol, frame: &SignalFrame) -> bool {
        let (Some(high20), Some(slope), Some(atr20)) = (frame.high20, frame.ema50_slope, frame.atr20) else {
            return false;
        };
        if frame.close <= 0.0 {
            return false;
        }
        let is_breakout = frame.close > high20;
        let is_trending = slope >= EMA_SLOPE_ENTRY_THRESHOLD;
        let not_overheated = (atr20 / frame.close) <= ATR_OVERHEAT_THRESHOLD;
        is_breakout && is_trending && not_overheated
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
            if Money::from_f64(frame.close) < trailing_stop {
                return Some(ExitReason::TrailingStop);
            }
        }
        if let (Some(ema50), Some(slope)) = (frame.ema50, frame.ema50_slope) {
            if frame.close < ema50 && slope < EMA_SLOPE_EXIT_THRESHOLD {
                return Some(ExitReason::EmaStructureExit);
            }
        }
        None
    }

    fn calculate_stop_loss(&self, entry_price: Money, atr: f64) -> Money {
        entry_price - Money::from_f64(atr * ATR_STOP_MULTIPLIER)
    }

    fn re_entry_cooldown_days(&self) -> i64 {
        3
    }

    fn check_pyramid_signal(&self, ctx: &PyramidContext) -> bool {
        if ctx.current_mfe_r < PYRAMID_MIN_MFE_R {
            return false;
        }
        if ctx.total_open_risk_r >= PYRAMID_MAX_OPEN_RISK_R {
            return false;
        }
        let new_stop = self.calculate_stop_loss(Money::from_f64(ctx.frame.close), ctx.frame.atr20.unwrap_or(0.0));
        let new_r_unit = (Money::from_f64(ctx.frame.close) - new_stop).to_f64();
        let current_r_unit = (ctx.entry_price - ctx.initial_stop).to_f64();
        if new_r_unit <= 0.0 || new_r_unit >= current_r_unit {
            return false;
        }
        let breaks_high10 = ctx.frame.high10.map(|h| ctx.frame.close > h).unwrap_or(false);
        let breaks_high20 = ctx.frame.high20.map(|h| ctx.frame.close > h).unwrap_or(false);
        breaks_high10 || breaks_high20
    }

    fn calculate_pyramid_size(&self, ctx: &PyramidContext) -> u64 {
        let new_stop = self.calculate_stop_loss(Money::from_f64(ctx.frame.close), ctx.frame.atr20.unwrap_or(0.0));
        let r_unit = (Money::from_f64(ctx.frame.close) - new_stop).to_f64();
        if r_unit <= 0.0 {
            return 0;
        }
        let base_r = ctx.entry_price.to_f64() - ctx.initial_stop.to_f64();
        if base_r <= 0.0 {
            return 0;
        }
        let remaining_r = (PYRAMID_MAX_OPEN_RISK_R - ctx.total_open_risk_r).max(0.0);
        let add_on_r = PYRAMID_ADD_ON_RISK_R.min(remaining_r);
        let risk_amount = add_on_r * base_r;
        (risk_amount / r_unit).floor().max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_frame(close: f64, high20: f64, slope: f64, atr20: f64) -> SignalFrame {
        SignalFrame {
            date: NaiveDate::parse_from_str("2024-05-01", "%Y-%m-%d").unwrap(),
            close,
            high20: Some(high20),
            ema50_slope: Some(slope),
            atr20: Some(atr20),
            ..Default::default()
        }
    }

    #[test]
    fn test_entry_rejects_when_overheated() {
        let strategy = TrendFollowingStrategy;
        let ticker = Symbol::new("035720");
        // atr20/close = 10/100 = 0.10 > 0.08 overheat threshold
        let f = base_frame(100.0, 95.0, 0.0, 10.0);
        assert!(!strategy.check_entry_signal(&ticker, &f));
    }

    #[test]
    fn test_entry_accepts_clean_breakout() {
        let strategy = TrendFollowingStrategy;
        let ticker = Symbol::new("035720");
        let f = base_frame(100.0, 95.0, 0.0, 2.0);
        assert!(strategy.check_entry_signal(&ticker, &f));
    }

    #[test]
    fn test_pyramid_requires_min_mfe() {
        let strategy = TrendFollowingStrategy;
        let ticker = Symbol::new("035720");
        let frame = base_frame(110.0, 95.0, 0.0, 2.0);
        let ctx = PyramidContext {
            ticker: &ticker,
            frame: &frame,
            entry_price: Money::from_f64(100.0),
            initial_stop: Money::from_f64(96.0),
            current_mfe_r: 0.5,
            total_open_risk_r: 1.0,
        };
        assert!(!strategy.check_pyramid_signal(&ctx));
    }

    #[test]
    fn test_pyramid_blocked_by_open_risk_cap() {
        let strategy = TrendFollowingStrategy;
        let ticker = Symbol::new("035720");
        let frame = SignalFrame { high10: Some(100.0), ..base_frame(110.0, 95.0, 0.0, 2.0) };
        let ctx = PyramidContext {
            ticker: &ticker,
            frame: &frame,
            entry_price: Money::from_f64(100.0),
            initial_stop: Money::from_f64(96.0),
            current_mfe_r: 2.0,
            total_open_risk_r: 2.0,
        };
        assert!(!strategy.check_pyramid_signal(&ctx));
    }
}
