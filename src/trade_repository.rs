//! Trade sink
//!
//! Stands in for the engine's external row-store: a fill-by-fill record of
//! what happened, decoupled from in-memory accounting. Failures here are
//! caught by the engine and logged, never allowed to corrupt the ledger.

use chrono::NaiveDate;
use tracing::info;

use crate::types::{EngineError, ExitReason, Money, Symbol};

pub type SessionId = u64;

pub trait TradeRepository {
    fn create_session(
        &mut self,
        strategy_name: &str,
        start: NaiveDate,
        end: NaiveDate,
        initial_capital: Money,
        risk_per_trade: f64,
    ) -> Result<SessionId, EngineError>;

    fn record_buy(
        &mut self,
        ticker: &Symbol,
        date: NaiveDate,
        price: Money,
        shares: u64,
        stop_loss: Money,
        atr: f64,
    ) -> Result<(), EngineError>;

    #[allow(clippy::too_many_arguments)]
    fn record_sell(
        &mut self,
        ticker: &Symbol,
        date: NaiveDate,
        price: Money,
        shares: u64,
        reason: ExitReason,
        pnl: Money,
        pnl_pct: f64,
        r_multiple: f64,
    ) -> Result<(), EngineError>;

    fn update_highest_close(&mut self, ticker: &Symbol, value: Money) -> Result<(), EngineError>;
}

/// No-op sink: used when no external recording is needed.
#[derive(Debug, Default)]
pub struct NullTradeRepository {
    next_session_id: SessionId,
}

impl TradeRepository for NullTradeRepository {
    fn create_session(
        &mut self,
        _strategy_name: &str,
        _start: NaiveDate,
        _end: NaiveDate,
        _initial_capital: Money,
        _risk_per_trade: f64,
    ) -> Result<SessionId, EngineError> {
        self.next_session_id += 1;
        Ok(self.next_session_id)
    }

    fn record_buy(&mut self, _ticker: &Symbol, _date: NaiveDate, _price: Money, _shares: u64, _stop_loss: Money, _atr: f64) -> Result<(), EngineError> {
        Ok(())
    }

    fn record_sell(
        &mut self,
        _ticker: &Symbol,
        _date: NaiveDate,
        _price: Money,
        _shares: u64,
        _reason: ExitReason,
        _pnl: Money,
        _pnl_pct: f64,
        _r_multiple: f64,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn update_highest_close(&mut self, _ticker: &Symbol, _value: Money) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Sink that emits structured log lines per fill instead of writing to an
/// external store.
#[derive(Debug, Default)]
pub struct LoggingTradeRepository {
    session_id: Option<SessionId>,
    next_session_id: SessionId,
}

impl TradeRepository for LoggingTradeRepository {
    fn create_session(
        &mut self,
        strategy_name: &str,
        start: NaiveDate,
        end: NaiveDate,
        initial_capital: Money,
        risk_per_trade: f64,
    ) -> Result<SessionId, EngineError> {
        self.next_session_id += 1;
        let id = self.next_session_id;
        self.session_id = Some(id);
        info!(session_id = id, strategy_name, %start, %end, %initial_capital, risk_per_trade, "session created");
        Ok(id)
    }

    fn record_buy(&mut self, ticker: &Symbol, date: NaiveDate, price: Money, shares: u64, stop_loss: Money, atr: f64) -> Result<(), EngineError> {
        info!(session_id = ?self.session_id, ticker = %ticker, %date, %price, shares, %stop_loss, atr, "BUY");
        Ok(())
    }

    fn record_sell(
        &mut self,
        ticker: &Symbol,
        date: NaiveDate,
        price: Money,
        shares: u64,
        reason: ExitReason,
        pnl: Money,
        pnl_pct: f64,
        r_multiple: f64,
    ) -> Result<(), EngineError> {
        info!(
            session_id = ?self.session_id, ticker = %ticker, %date, %price, shares,
            reason = %reason, %pnl, pnl_pct, r_multiple, "SELL"
        );
        Ok(())
    }

    fn update_highest_close(&mut self, ticker: &Symbol, value: Money) -> Result<(), EngineError> {
        info!(session_id = ?self.session_id, ticker = %ticker, %value, "highest_close updated");
        Ok(())
    }
}
