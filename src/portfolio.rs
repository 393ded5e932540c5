//! Portfolio: cash, open positions, closed trades, daily equity curve

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::info;

use crate::types::{DailyRecord, EngineError, ExitReason, Money, Position, PositionKey, Symbol, Trade};

pub struct Portfolio {
    pub initial_capital: Money,
    pub cash: Money,
    pub positions: HashMap<PositionKey, Position>,
    pub trades: Vec<Trade>,
    pub daily_records: Vec<DailyRecord>,
}

impl Portfolio {
    pub fn new(initial_capital: Money) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
            daily_records: Vec::new(),
        }
    }

    /// Sum of cost basis (entry price * shares) across every open position,
    /// matching the original's own cost-basis equity accounting — positions
    /// are only marked to market in [`Portfolio::record_daily`].
    pub fn position_cost_basis(&self) -> Money {
        self.positions.values().map(|p| p.entry_price * Money::from_i64(p.shares as i64)).sum()
    }

    pub fn equity(&self) -> Money {
        self.cash + self.position_cost_basis()
    }

    pub fn total_risk(&self) -> Money {
        self.positions
            .values()
            .map(|p| (p.entry_price - p.stop_loss) * Money::from_i64(p.shares as i64))
            .sum()
    }

    pub fn total_risk_pct(&self) -> f64 {
        let equity = self.equity();
        if equity.is_zero() {
            return 0.0;
        }
        (self.total_risk() / equity).to_f64()
    }

    pub fn has_base_position(&self, ticker: &Symbol) -> bool {
        self.positions.contains_key(&PositionKey::Base(ticker.clone()))
    }

    pub fn base_position(&self, ticker: &Symbol) -> Option<&Position> {
        self.positions.get(&PositionKey::Base(ticker.clone()))
    }

    /// All open position keys (base + add-ons) for a ticker.
    pub fn positions_for(&self, ticker: &Symbol) -> Vec<&PositionKey> {
        self.positions.keys().filter(|k| k.ticker() == ticker).collect()
    }

    pub fn open_position(
        &mut self,
        key: PositionKey,
        date: NaiveDate,
        price: Money,
        shares: u64,
        stop_loss: Money,
        atr: f64,
    ) -> Result<(), EngineError> {
        if price <= stop_loss {
            return Err(EngineError::InvalidStop { entry: price, stop: stop_loss });
        }
        let cost = price * Money::from_i64(shares as i64);
        if cost > self.cash {
            return Err(EngineError::InsufficientCash { needed: cost, available: self.cash });
        }

        let position = Position {
            ticker: key.ticker().clone(),
            entry_date: date,
            entry_price: price,
            shares,
            stop_loss,
            highest_close: price,
            atr_at_entry: atr,
        };
        self.cash -= cost;
        info!(ticker = %position.ticker, date = %date, price = %price, shares, "position opened");
        self.positions.insert(key, position);
        Ok(())
    }

    /// Close a position, returning the resulting trade. `None` if the key
    /// is not an open position — callers treat this as a no-op.
    pub fn close_position(&mut self, key: &PositionKey, date: NaiveDate, price: Money, reason: ExitReason) -> Option<Trade> {
        let position = self.positions.remove(key)?;

        let pnl = (price - position.entry_price) * Money::from_i64(position.shares as i64);
        let pnl_pct = ((price - position.entry_price) / position.entry_price).to_f64() * 100.0;

        let r_unit = position.r_unit();
        let r_multiple = if r_unit.is_positive() {
            (price - position.entry_price).to_f64() / r_unit.to_f64()
        } else {
            0.0
        };

        let trade = Trade {
            ticker: position.ticker.clone(),
            entry_date: position.entry_date,
            exit_date: date,
            entry_price: position.entry_price,
            exit_price: price,
            shares: position.shares,
            exit_reason: reason,
            pnl,
            pnl_pct,
            r_multiple,
        };

        self.cash += price * Money::from_i64(position.shares as i64);
        info!(ticker = %trade.ticker, date = %date, price = %price, reason = %reason, pnl = %pnl, r_multiple, "position closed");
        self.trades.push(trade.clone());
        Some(trade)
    }

    /// Mark every open position's trailing high to today's close, if higher.
    pub fn update_highest_close(&mut self, key: &PositionKey, close: Money) {
        if let Some(position) = self.positions.get_mut(key) {
            if close > position.highest_close {
                position.highest_close = close;
            }
        }
    }

    /// End-of-day snapshot. A held ticker with no entry in `prices` is
    /// valued at its entry price — the same fallback the original ledger
    /// uses rather than treating a missing quote as a hard error.
    pub fn record_daily(&mut self, date: NaiveDate, prices: &HashMap<Symbol, Money>) {
        let position_value: Money = self
            .positions
            .values()
            .map(|p| {
                let price = prices.get(&p.ticker).copied().unwrap_or(p.entry_price);
                price * Money::from_i64(p.shares as i64)
            })
            .sum();

        let equity = self.cash + position_value;

        self.daily_records.push(DailyRecord {
            date,
            cash: self.cash,
            equity,
            open_positions: self.positions.len(),
        });
    }

    pub fn get_stats(&self) -> BasicStats {
        if self.trades.is_empty() {
            return BasicStats::default();
        }

        let winning = self.trades.iter().filter(|t| t.pnl.is_positive()).count();
        let losing = self.trades.len() - winning;
        let total_pnl: Money = self.trades.iter().map(|t| t.pnl).sum();

        BasicStats {
            total_trades: self.trades.len(),
            winning_trades: winning,
            losing_trades: losing,
            win_rate: winning as f64 / self.trades.len() as f64 * 100.0,
            total_pnl,
            total_return_pct: (total_pnl / self.initial_capital).to_f64() * 100.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: Money,
    pub total_return_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_open_position_rejects_insufficient_cash() {
        let mut pf = Portfolio::new(Money::from_f64(1_000.0));
        let key = PositionKey::Base(Symbol::new("005930"));
        let err = pf
            .open_position(key, date("2024-01-02"), Money::from_f64(100.0), 100, Money::from_f64(95.0), 2.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientCash { .. }));
    }

    #[test]
    fn test_open_then_close_computes_r_multiple() {
        let mut pf = Portfolio::new(Money::from_f64(100_000.0));
        let key = PositionKey::Base(Symbol::new("005930"));
        pf.open_position(key.clone(), date("2024-01-02"), Money::from_f64(100.0), 100, Money::from_f64(95.0), 2.0).unwrap();

        let trade = pf.close_position(&key, date("2024-01-10"), Money::from_f64(110.0), ExitReason::TrailingStop).unwrap();
        assert_eq!(trade.r_multiple, 2.0);
        assert_eq!(trade.pnl, Money::from_f64(1_000.0));
    }

    #[test]
    fn test_close_unknown_position_is_noop() {
        let mut pf = Portfolio::new(Money::from_f64(100_000.0));
        let key = PositionKey::Base(Symbol::new("005930"));
        assert!(pf.close_position(&key, date("2024-01-02"), Money::from_f64(100.0), ExitReason::StopLoss).is_none());
    }

    #[test]
    fn test_record_daily_falls_back_to_entry_price() {
        let mut pf = Portfolio::new(Money::from_f64(100_000.0));
        let ticker = Symbol::new("005930");
        let key = PositionKey::Base(ticker.clone());
        pf.open_position(key, date("2024-01-02"), Money::from_f64(100.0), 100, Money::from_f64(95.0), 2.0).unwrap();

        pf.record_daily(date("2024-01-03"), &HashMap::new());
        let record = pf.daily_records.last().unwrap();
        // no price supplied for the held ticker: valued at entry price (100 * 100 = 10,000)
        assert_eq!(record.equity, Money::from_f64(90_000.0) + Money::from_f64(10_000.0));
    }

    #[test]
    fn test_pyramid_add_on_key_coexists_with_base() {
        let mut pf = Portfolio::new(Money::from_f64(1_000_000.0));
        let ticker = Symbol::new("005930");
        pf.open_position(PositionKey::Base(ticker.clone()), date("2024-01-02"), Money::from_f64(100.0), 100, Money::from_f64(95.0), 2.0).unwrap();
        pf.open_position(PositionKey::AddOn(ticker.clone(), 1), date("2024-01-05"), Money::from_f64(110.0), 20, Money::from_f64(104.0), 2.0).unwrap();

        assert_eq!(pf.positions_for(&ticker).len(), 2);
    }
}
