//! Strategy trait
//!
//! A strategy is a pure decision function: given a signal frame (and, for
//! exits, the open position's entry context) it returns a yes/no or a
//! reason, never touching portfolio state directly. The engine is the only
//! thing that opens or closes positions.

use chrono::NaiveDate;

use crate::market_filter::MarketFilter;
use crate::signal_frame::SignalFrame;
use crate::types::{ExitReason, Money, Symbol};

/// Context passed to a strategy's pyramid (add-on) decision, carrying the
/// open position's current state since a pyramid decision, unlike base
/// entry/exit, genuinely needs to know what's already been bought.
pub struct PyramidContext<'a> {
    pub ticker: &'a Symbol,
    pub frame: &'a SignalFrame,
    pub entry_price: Money,
    pub initial_stop: Money,
    pub current_mfe_r: f64,
    pub total_open_risk_r: f64,
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Broad market regime gate, checked once per day before any per-ticker scan.
    fn check_market_filter(&self, _date: NaiveDate, _market: &MarketFilter) -> bool {
        true
    }

    /// Pure entry decision from today's signal frame.
    fn check_entry_signal(&self, ticker: &Symbol, frame: &SignalFrame) -> bool;

    /// Pure exit decision. `highest_close` is the position's trailing high
    /// watermark (monotone, updated by the engine before this is called).
    #[allow(clippy::too_many_arguments)]
    fn check_exit_signal(
        &self,
        ticker: &Symbol,
        frame: &SignalFrame,
        entry_price: Money,
        entry_date: NaiveDate,
        highest_close: Money,
        initial_stop: Money,
    ) -> Option<ExitReason>;

    fn calculate_stop_loss(&self, entry_price: Money, atr: f64) -> Money;

    fn calculate_position_size(&self, capital: Money, risk_pct: f64, entry_price: Money, stop_loss: Money) -> u64 {
        if entry_price <= stop_loss {
            return 0;
        }
        let r_unit = (entry_price - stop_loss).to_f64();
        let risk_amount = capital.to_f64() * risk_pct;
        (risk_amount / r_unit).floor().max(0.0) as u64
    }

    /// Trading days required after a `TRAILING_STOP` exit before the same
    /// ticker may be re-entered.
    fn re_entry_cooldown_days(&self) -> i64 {
        5
    }

    /// Whether this strategy adds to winners. Most reference strategies
    /// don't; the default refusing every pyramid check keeps the engine's
    /// pyramid scan a no-op for them.
    fn check_pyramid_signal(&self, _ctx: &PyramidContext) -> bool {
        false
    }

    fn calculate_pyramid_size(&self, _ctx: &PyramidContext) -> u64 {
        0
    }

    fn on_entry(&self, ticker: &Symbol, frame: &SignalFrame, shares: u64) {
        tracing::info!(ticker = %ticker, date = %frame.date, close = frame.close, shares, "entry signal");
    }

    fn on_exit(&self, ticker: &Symbol, frame: &SignalFrame, reason: ExitReason) {
        tracing::info!(ticker = %ticker, date = %frame.date, close = frame.close, reason = %reason, "exit signal");
    }
}
