//! Daily event-driven simulation loop
//!
//! Ground truth for step order is the original engine's `_process_day`:
//! clear the stop-loss tracker, check the market filter, process queued
//! entries at today's open, process exits at today's close, scan new
//! entries and pyramid add-ons, then record the day regardless of whether
//! any of the above raised.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::candle_store::CandleStore;
use crate::config::EngineConfig;
use crate::market_filter::MarketFilter;
use crate::portfolio::Portfolio;
use crate::risk::{RiskManager, RiskState};
use crate::signal_frame::SignalFrameCache;
use crate::strategy::{PyramidContext, Strategy};
use crate::trade_repository::{SessionId, TradeRepository};
use crate::types::{DailyRecord, EngineError, ExitReason, Money, PositionKey, Symbol, Trade};

/// Entry signalled on day `signal_date`, to be filled at the next trading
/// day's open. Carries the signal-day ATR since the stop is sized from it,
/// not from whatever ATR prevails on the fill day.
#[derive(Debug, Clone)]
struct PendingEntry {
    ticker: Symbol,
    atr: f64,
}

#[derive(Debug, Clone)]
struct LastExitInfo {
    exit_date: NaiveDate,
    exit_reason: ExitReason,
}

/// Runs a strategy over a fixed ticker universe and date range, producing a
/// closed-form [`SessionResult`].
pub struct BacktestEngine<'a> {
    config: EngineConfig,
    strategy: Box<dyn Strategy>,
    store: &'a dyn CandleStore,
    repo: Box<dyn TradeRepository>,

    portfolio: Portfolio,
    risk_manager: RiskManager,

    pending_entries: Vec<PendingEntry>,
    stopped_out_today: std::collections::HashSet<Symbol>,
    last_exit_info: HashMap<Symbol, LastExitInfo>,

    recent_trade_results: Vec<bool>,
    kill_switch_active: bool,
    kill_switch_activated_date: Option<NaiveDate>,

    next_add_on_seq: HashMap<Symbol, u32>,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(
        config: EngineConfig,
        strategy: Box<dyn Strategy>,
        store: &'a dyn CandleStore,
        repo: Box<dyn TradeRepository>,
    ) -> Self {
        let initial_capital = Money::from_f64(config.initial_capital);
        let mut risk_manager = RiskManager::new(config.risk_manager_config());
        risk_manager.update_peak_equity(initial_capital);

        Self {
            config,
            strategy,
            store,
            repo,
            portfolio: Portfolio::new(initial_capital),
            risk_manager,
            pending_entries: Vec::new(),
            stopped_out_today: std::collections::HashSet::new(),
            last_exit_info: HashMap::new(),
            recent_trade_results: Vec::new(),
            kill_switch_active: false,
            kill_switch_activated_date: None,
            next_add_on_seq: HashMap::new(),
        }
    }

    pub fn run(&mut self, start: NaiveDate, end: NaiveDate, tickers: &[Symbol]) -> Result<SessionResult, EngineError> {
        let session_id = self.repo.create_session(
            self.strategy.name(),
            start,
            end,
            self.portfolio.initial_capital,
            self.config.base_risk_pct,
        )?;

        let trading_days = self.store.trading_days(start, end)?;
        tracing::info!(strategy = self.strategy.name(), %start, %end, tickers = tickers.len(), days = trading_days.len(), "backtest started");

        let market_indices = self.config.market_indices();
        let market_cache = SignalFrameCache::build(self.store, &market_indices, start, end)?;
        let market = MarketFilter::new(market_indices, market_cache);
        let signal_cache = SignalFrameCache::build(self.store, tickers, start, end)?;

        for (i, &date) in trading_days.iter().enumerate() {
            if let Err(err) = self.process_day(date, tickers, &market, &signal_cache, &trading_days[..i]) {
                tracing::error!(%date, error = %err, "error while processing trading day");
            }
        }

        if let Some(&last_date) = trading_days.last() {
            self.close_all_positions(last_date, tickers, &signal_cache);
        }

        tracing::info!(strategy = self.strategy.name(), trades = self.portfolio.trades.len(), "backtest finished");
        Ok(self.generate_result(session_id, start, end))
    }

    fn process_day(
        &mut self,
        date: NaiveDate,
        tickers: &[Symbol],
        market: &MarketFilter,
        cache: &SignalFrameCache,
        days_so_far: &[NaiveDate],
    ) -> Result<(), EngineError> {
        self.stopped_out_today.clear();

        let is_market_ok = self.strategy.check_market_filter(date, market);

        self.process_pending_entries(date, is_market_ok, cache)?;
        self.process_exits(date, cache, days_so_far)?;

        if is_market_ok {
            self.scan_entry_signals(date, tickers, cache, days_so_far)?;
            self.scan_pyramid_signals(date, cache)?;
        }

        let mut prices = HashMap::new();
        for ticker in tickers {
            if let Some(frame) = cache.get(ticker, date) {
                prices.insert(ticker.clone(), Money::from_f64(frame.close));
            }
        }
        self.portfolio.record_daily(date, &prices);
        self.risk_manager.update_peak_equity(self.portfolio.equity());

        Ok(())
    }

    fn process_pending_entries(&mut self, date: NaiveDate, is_market_ok: bool, cache: &SignalFrameCache) -> Result<(), EngineError> {
        let pending = std::mem::take(&mut self.pending_entries);
        for entry in pending {
            let Some(frame) = cache.get(&entry.ticker, date) else {
                continue;
            };
            if !is_market_ok || self.portfolio.has_base_position(&entry.ticker) {
                continue;
            }

            let entry_price = Money::from_f64(frame.open);
            let stop_loss = self.strategy.calculate_stop_loss(entry_price, entry.atr);
            let shares = self.risk_manager.calculate_position_size(self.portfolio.equity(), entry_price, stop_loss);
            if shares == 0 {
                continue;
            }

            let new_risk = (entry_price - stop_loss) * Money::from_i64(shares as i64);
            let new_risk_pct = (new_risk / self.portfolio.equity()).to_f64();
            if !self.risk_manager.can_take_risk(self.portfolio.total_risk_pct(), new_risk_pct) {
                tracing::info!(%date, ticker = %entry.ticker, "entry skipped: portfolio risk cap");
                continue;
            }

            let cost = entry_price * Money::from_i64(shares as i64);
            let shares = if cost > self.portfolio.cash {
                (self.portfolio.cash.to_f64() / entry_price.to_f64()).floor() as u64
            } else {
                shares
            };
            if shares == 0 {
                continue;
            }

            let key = PositionKey::Base(entry.ticker.clone());
            if self.portfolio.open_position(key, date, entry_price, shares, stop_loss, entry.atr).is_ok() {
                self.strategy.on_entry(&entry.ticker, frame, shares);
                if let Err(err) = self.repo.record_buy(&entry.ticker, date, entry_price, shares, stop_loss, entry.atr) {
                    tracing::error!(%date, ticker = %entry.ticker, error = %err, "trade sink failure on buy");
                }
            }
        }
        Ok(())
    }

    fn process_exits(&mut self, date: NaiveDate, cache: &SignalFrameCache, days_so_far: &[NaiveDate]) -> Result<(), EngineError> {
        let keys: Vec<PositionKey> = self.portfolio.positions.keys().cloned().collect();
        let mut to_close = Vec::new();

        for key in keys {
            let ticker = self.portfolio.positions[&key].ticker.clone();
            let Some(frame) = cache.get(&ticker, date) else {
                continue;
            };

            self.portfolio.update_highest_close(&key, Money::from_f64(frame.close));
            if let Err(err) = self.repo.update_highest_close(&ticker, Money::from_f64(frame.close)) {
                tracing::error!(%date, ticker = %ticker, error = %err, "trade sink failure on highest_close update");
            }

            let position = &self.portfolio.positions[&key];
            let reason = self.strategy.check_exit_signal(
                &position.ticker,
                frame,
                position.entry_price,
                position.entry_date,
                position.highest_close,
                position.stop_loss,
            );

            if let Some(reason) = reason {
                to_close.push((key, frame.close, reason));
            }
        }

        for (key, close, reason) in to_close {
            let ticker = key.ticker().clone();
            let Some(trade) = self.portfolio.close_position(&key, date, Money::from_f64(close), reason) else {
                continue;
            };
            self.strategy.on_exit(&ticker, cache.get(&ticker, date).unwrap(), reason);

            if let Err(err) = self.repo.record_sell(&ticker, date, trade.exit_price, trade.shares, reason, trade.pnl, trade.pnl_pct, trade.r_multiple) {
                tracing::error!(%date, ticker = %ticker, error = %err, "trade sink failure on sell");
            }

            if reason == ExitReason::StopLoss {
                self.stopped_out_today.insert(ticker.clone());
            }
            self.last_exit_info.insert(ticker.clone(), LastExitInfo { exit_date: date, exit_reason: reason });

            let is_win = trade.pnl.is_positive();
            self.recent_trade_results.push(is_win);
            if self.recent_trade_results.len() > self.config.kill_switch_window as usize {
                self.recent_trade_results.remove(0);
            }
            if self.recent_trade_results.len() >= self.config.kill_switch_window as usize {
                let fail_count = self.recent_trade_results.iter().filter(|&&w| !w).count() as u32;
                if fail_count >= self.config.kill_switch_loss_count && !self.kill_switch_active {
                    self.kill_switch_active = true;
                    self.kill_switch_activated_date = Some(date);
                    tracing::warn!(%date, fail_count, "kill switch activated: trading halted");
                }
            }

            let is_stop = reason == ExitReason::StopLoss;
            self.risk_manager.on_trade_exit(is_stop, trade.r_multiple, self.portfolio.equity());
            let _ = &days_so_far;
        }

        Ok(())
    }

    fn scan_entry_signals(&mut self, date: NaiveDate, tickers: &[Symbol], cache: &SignalFrameCache, days_so_far: &[NaiveDate]) -> Result<(), EngineError> {
        if self.kill_switch_active {
            if let Some(activated) = self.kill_switch_activated_date {
                let days_passed = days_so_far.iter().filter(|d| **d > activated).count() as i64 + 1;
                if days_passed >= self.config.kill_switch_cooldown_days {
                    self.kill_switch_active = false;
                    self.kill_switch_activated_date = None;
                    self.recent_trade_results.clear();
                    tracing::info!(%date, "kill switch cleared: cooldown elapsed");
                }
            }
        }
        if self.kill_switch_active {
            return Ok(());
        }

        let drawdown = self.risk_manager.check_drawdown(self.portfolio.equity());
        if drawdown >= self.config.drawdown_entry_block {
            tracing::info!(%date, drawdown, "new entries blocked: drawdown gate");
            return Ok(());
        }

        for ticker in tickers {
            if self.portfolio.has_base_position(ticker) {
                continue;
            }
            if self.pending_entries.iter().any(|p| &p.ticker == ticker) {
                continue;
            }
            if self.stopped_out_today.contains(ticker) {
                continue;
            }
            if !self.check_reentry_allowed(ticker, date, days_so_far) {
                continue;
            }

            let Some(frame) = cache.get(ticker, date) else {
                continue;
            };
            let Some(atr20) = frame.atr20 else {
                continue;
            };

            if self.strategy.check_entry_signal(ticker, frame) {
                self.pending_entries.push(PendingEntry { ticker: ticker.clone(), atr: atr20 });
                tracing::info!(%date, ticker = %ticker, "entry signal queued for next open");
            }
        }

        Ok(())
    }

    fn check_reentry_allowed(&self, ticker: &Symbol, current_date: NaiveDate, days_so_far: &[NaiveDate]) -> bool {
        let Some(exit_info) = self.last_exit_info.get(ticker) else {
            return true;
        };
        if exit_info.exit_reason != ExitReason::TrailingStop {
            return false;
        }
        let days_since_exit = days_so_far.iter().filter(|d| **d > exit_info.exit_date).count() as i64 + 1;
        let _ = current_date;
        days_since_exit >= self.strategy.re_entry_cooldown_days()
    }

    fn scan_pyramid_signals(&mut self, date: NaiveDate, cache: &SignalFrameCache) -> Result<(), EngineError> {
        let base_keys: Vec<PositionKey> = self
            .portfolio
            .positions
            .keys()
            .filter(|k| matches!(k, PositionKey::Base(_)))
            .cloned()
            .collect();

        for key in base_keys {
            let position = self.portfolio.positions[&key].clone();
            let Some(frame) = cache.get(&position.ticker, date) else {
                continue;
            };
            let Some(atr20) = frame.atr20 else {
                continue;
            };

            let r_unit = (position.entry_price - position.stop_loss).to_f64();
            if r_unit <= 0.0 {
                continue;
            }
            let current_mfe_r = (frame.close - position.entry_price.to_f64()) / r_unit;

            let one_r_amount = self.portfolio.equity().to_f64() * self.config.base_risk_pct;
            let total_open_risk_r = if one_r_amount > 0.0 {
                self.portfolio.total_risk().to_f64() / one_r_amount
            } else {
                0.0
            };

            let ctx = PyramidContext {
                ticker: &position.ticker,
                frame,
                entry_price: position.entry_price,
                initial_stop: position.stop_loss,
                current_mfe_r,
                total_open_risk_r,
            };

            if !self.strategy.check_pyramid_signal(&ctx) {
                continue;
            }

            let shares = self.strategy.calculate_pyramid_size(&ctx);
            if shares == 0 {
                continue;
            }

            let price = Money::from_f64(frame.close);
            let cost = price * Money::from_i64(shares as i64);
            let shares = if cost > self.portfolio.cash {
                (self.portfolio.cash.to_f64() / price.to_f64()).floor() as u64
            } else {
                shares
            };
            if shares == 0 {
                continue;
            }

            let new_stop = self.strategy.calculate_stop_loss(price, atr20);
            let seq = self.next_add_on_seq.entry(position.ticker.clone()).or_insert(0);
            *seq += 1;
            let add_on_key = PositionKey::AddOn(position.ticker.clone(), *seq);

            if self.portfolio.open_position(add_on_key, date, price, shares, new_stop, atr20).is_ok() {
                tracing::info!(%date, ticker = %position.ticker, shares, current_mfe_r, "pyramid add-on opened");
            }
        }

        Ok(())
    }

    fn close_all_positions(&mut self, date: NaiveDate, tickers: &[Symbol], cache: &SignalFrameCache) {
        let _ = tickers;
        let keys: Vec<PositionKey> = self.portfolio.positions.keys().cloned().collect();
        for key in keys {
            let position = &self.portfolio.positions[&key];
            let price = cache
                .get(&position.ticker, date)
                .map(|f| Money::from_f64(f.close))
                .unwrap_or(position.highest_close);

            if let Some(trade) = self.portfolio.close_position(&key, date, price, ExitReason::ForceExit) {
                tracing::info!(%date, ticker = %trade.ticker, price = %trade.exit_price, pnl = %trade.pnl, "force-closed at end of backtest");
                if let Err(err) = self.repo.record_sell(&trade.ticker, date, trade.exit_price, trade.shares, trade.exit_reason, trade.pnl, trade.pnl_pct, trade.r_multiple) {
                    tracing::error!(%date, ticker = %trade.ticker, error = %err, "trade sink failure on force-close");
                }
            }
        }
    }

    fn generate_result(&self, session_id: SessionId, start: NaiveDate, end: NaiveDate) -> SessionResult {
        let stats = SessionStats::compute(&self.portfolio.trades, &self.portfolio.daily_records, self.portfolio.initial_capital);
        SessionResult {
            session_id,
            start_date: start,
            end_date: end,
            initial_capital: self.portfolio.initial_capital,
            final_equity: self.portfolio.equity(),
            stats,
            trades: self.portfolio.trades.clone(),
            daily_records: self.portfolio.daily_records.clone(),
            risk_state: self.risk_manager.state.clone(),
        }
    }
}

/// A completed backtest run: everything needed to report or persist results.
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Money,
    pub final_equity: Money,
    pub stats: SessionStats,
    pub trades: Vec<Trade>,
    pub daily_records: Vec<DailyRecord>,
    pub risk_state: RiskState,
}

/// Summary statistics computed from a session's closed trades and equity curve.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: Money,
    pub total_return_pct: f64,
    pub cagr: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_date: Option<NaiveDate>,
    pub sharpe_ratio: f64,
    pub profit_factor: f64,
    pub avg_r_multiple: f64,
    pub avg_holding_days: f64,
    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
}

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const RISK_FREE_RATE: f64 = 0.03;

impl SessionStats {
    fn compute(trades: &[Trade], daily_records: &[DailyRecord], initial_capital: Money) -> Self {
        if trades.is_empty() || daily_records.is_empty() {
            return Self::default();
        }

        let winning: Vec<&Trade> = trades.iter().filter(|t| t.pnl.is_positive()).collect();
        let losing: Vec<&Trade> = trades.iter().filter(|t| !t.pnl.is_positive()).collect();
        let total_pnl: Money = trades.iter().map(|t| t.pnl).sum();

        let gross_profit: Money = winning.iter().map(|t| t.pnl).sum();
        let gross_loss: Money = losing.iter().map(|t| t.pnl.abs()).sum();
        let profit_factor = if !gross_loss.is_zero() {
            gross_profit.to_f64() / gross_loss.to_f64()
        } else if gross_profit.is_positive() {
            f64::INFINITY
        } else {
            0.0
        };

        let final_equity = daily_records.last().unwrap().equity;
        let total_return_pct = ((final_equity - initial_capital) / initial_capital).to_f64() * 100.0;

        let years = (daily_records.last().unwrap().date - daily_records.first().unwrap().date).num_days() as f64 / 365.25;
        let cagr = if years > 0.0 && initial_capital.is_positive() && final_equity.is_positive() {
            (final_equity.to_f64() / initial_capital.to_f64()).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let mut peak = initial_capital;
        let mut max_dd = 0.0;
        let mut max_dd_date = None;
        for record in daily_records {
            if record.equity > peak {
                peak = record.equity;
            }
            if !peak.is_zero() {
                let dd = ((peak - record.equity) / peak).to_f64();
                if dd > max_dd {
                    max_dd = dd;
                    max_dd_date = Some(record.date);
                }
            }
        }

        let daily_returns: Vec<f64> = daily_records
            .windows(2)
            .filter(|w| !w[0].equity.is_zero())
            .map(|w| (w[1].equity - w[0].equity).to_f64() / w[0].equity.to_f64())
            .collect();
        let sharpe_ratio = if !daily_returns.is_empty() {
            let mean = daily_returns.iter().sum::<f64>() / daily_returns.len() as f64;
            let variance = daily_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / daily_returns.len() as f64;
            let std_dev = variance.sqrt();
            if std_dev > 0.0 {
                let daily_risk_free = RISK_FREE_RATE / TRADING_DAYS_PER_YEAR;
                (mean - daily_risk_free) / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };

        let avg_r_multiple = trades.iter().map(|t| t.r_multiple).sum::<f64>() / trades.len() as f64;
        let avg_holding_days = trades.iter().map(|t| (t.exit_date - t.entry_date).num_days() as f64).sum::<f64>() / trades.len() as f64;

        let (mut max_wins, mut max_losses, mut cur_wins, mut cur_losses) = (0u32, 0u32, 0u32, 0u32);
        for trade in trades {
            if trade.pnl.is_positive() {
                cur_wins += 1;
                cur_losses = 0;
            } else {
                cur_losses += 1;
                cur_wins = 0;
            }
            max_wins = max_wins.max(cur_wins);
            max_losses = max_losses.max(cur_losses);
        }

        Self {
            total_trades: trades.len(),
            winning_trades: winning.len(),
            losing_trades: losing.len(),
            win_rate: winning.len() as f64 / trades.len() as f64 * 100.0,
            total_pnl,
            total_return_pct,
            cagr,
            max_drawdown_pct: max_dd * 100.0,
            max_drawdown_date: max_dd_date,
            sharpe_ratio,
            profit_factor,
            avg_r_multiple,
            avg_holding_days,
            max_consecutive_wins: max_wins,
            max_consecutive_losses: max_losses,
        }
    }
}
