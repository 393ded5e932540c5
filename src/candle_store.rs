//! Candle and indicator storage
//!
//! [`CandleStore`] is the engine's read-only view of market data: daily
//! candles plus precomputed indicator values, addressable by ticker and
//! date range. [`InMemoryCandleStore`] is the reference implementation used
//! by tests and the CLI, built from CSV files the way the original loader
//! built an in-process cache.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::indicators::{self, IndicatorKind, IndicatorParams, IndicatorValue};
use crate::types::{Candle, EngineError, Symbol};

/// Read-only, append-free view of market data over a date range.
pub trait CandleStore {
    /// All trading days with data in `[from, to]`, ascending, deduplicated
    /// across every ticker in the store.
    fn trading_days(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>, EngineError>;

    /// Candles for `ticker` in `[from, to]`, oldest first. Unknown ticker is
    /// a [`EngineError::DataUnavailable`]; an empty but valid range is `Ok(vec![])`.
    fn candles(&self, ticker: &Symbol, from: NaiveDate, to: NaiveDate) -> Result<Vec<Candle>, EngineError>;

    /// Precomputed indicator values for `ticker` in `[from, to]`.
    fn indicators(&self, ticker: &Symbol, from: NaiveDate, to: NaiveDate) -> Result<Vec<IndicatorValue>, EngineError>;
}

/// In-memory candle store with `O(1)` `(ticker, date)` lookup, loaded from CSV.
pub struct InMemoryCandleStore {
    candles: HashMap<Symbol, Vec<Candle>>,
    indicator_index: HashMap<Symbol, HashMap<NaiveDate, Vec<IndicatorValue>>>,
    all_days: Vec<NaiveDate>,
}

impl InMemoryCandleStore {
    pub fn new() -> Self {
        Self {
            candles: HashMap::new(),
            indicator_index: HashMap::new(),
            all_days: Vec::new(),
        }
    }

    /// Load one ticker's daily candles from a CSV file with columns
    /// `date,open,high,low,close,volume` and compute its standard indicator
    /// set (SMA20/60/120, EMA20/50/120, ATR20, RSI14, rolling highs 10/20,
    /// EMA50 slope).
    pub fn load_ticker_csv(&mut self, ticker: Symbol, path: impl AsRef<Path>) -> Result<()> {
        let candles = load_csv(path.as_ref())
            .with_context(|| format!("failed to load candles for {ticker}"))?;
        info!(ticker = %ticker, count = candles.len(), "loaded candles");
        self.insert_ticker(ticker, candles);
        Ok(())
    }

    /// Insert pre-built candles for a ticker and compute its indicator set.
    pub fn insert_ticker(&mut self, ticker: Symbol, candles: Vec<Candle>) {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let dates: Vec<NaiveDate> = candles.iter().map(|c| c.date).collect();

        let sma20 = indicators::sma(&closes, 20);
        let sma60 = indicators::sma(&closes, 60);
        let sma120 = indicators::sma(&closes, 120);
        let ema20 = indicators::ema(&closes, 20);
        let ema50 = indicators::ema(&closes, 50);
        let ema120 = indicators::ema(&closes, 120);
        let atr20 = indicators::atr(&highs, &lows, &closes, 20);
        let rsi14 = indicators::rsi(&closes, 14);
        let high10 = indicators::rolling_high_excluding_today(&closes, 10);
        let high20 = indicators::rolling_high_excluding_today(&closes, 20);
        let ema50_slope = indicators::ema_slope(&closes, 50, 20, &atr20);

        let mut by_date: HashMap<NaiveDate, Vec<IndicatorValue>> = HashMap::new();
        for (i, &date) in dates.iter().enumerate() {
            let mut values = Vec::with_capacity(7);
            let mut push = |kind: IndicatorKind, params: IndicatorParams, value: Option<f64>| {
                values.push(IndicatorValue {
                    ticker: ticker.clone(),
                    date,
                    kind,
                    params,
                    value,
                });
            };
            push(IndicatorKind::Sma, IndicatorParams::period(20), sma20[i]);
            push(IndicatorKind::Sma, IndicatorParams::period(60), sma60[i]);
            push(IndicatorKind::Sma, IndicatorParams::period(120), sma120[i]);
            push(IndicatorKind::Ema, IndicatorParams::period(20), ema20[i]);
            push(IndicatorKind::Ema, IndicatorParams::period(50), ema50[i]);
            push(IndicatorKind::Ema, IndicatorParams::period(120), ema120[i]);
            push(IndicatorKind::Atr, IndicatorParams::period(20), atr20[i]);
            push(IndicatorKind::Rsi, IndicatorParams::period(14), rsi14[i]);
            push(IndicatorKind::RollingHigh, IndicatorParams::period(10), high10[i]);
            push(IndicatorKind::RollingHigh, IndicatorParams::period(20), high20[i]);
            push(IndicatorKind::EmaSlope, IndicatorParams::period(50), ema50_slope[i]);
            by_date.insert(date, values);
        }

        for &d in &dates {
            if !self.all_days.contains(&d) {
                self.all_days.push(d);
            }
        }
        self.all_days.sort();

        self.indicator_index.insert(ticker.clone(), by_date);
        self.candles.insert(ticker, candles);
    }
}

impl Default for InMemoryCandleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleStore for InMemoryCandleStore {
    fn trading_days(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>, EngineError> {
        Ok(self
            .all_days
            .iter()
            .cloned()
            .filter(|d| *d >= from && *d <= to)
            .collect())
    }

    fn candles(&self, ticker: &Symbol, from: NaiveDate, to: NaiveDate) -> Result<Vec<Candle>, EngineError> {
        let all = self.candles.get(ticker).ok_or_else(|| EngineError::DataUnavailable {
            ticker: ticker.clone(),
            from,
            to,
        })?;
        Ok(all.iter().filter(|c| c.date >= from && c.date <= to).cloned().collect())
    }

    fn indicators(&self, ticker: &Symbol, from: NaiveDate, to: NaiveDate) -> Result<Vec<IndicatorValue>, EngineError> {
        let by_date = self.indicator_index.get(ticker).ok_or_else(|| EngineError::DataUnavailable {
            ticker: ticker.clone(),
            from,
            to,
        })?;
        let mut result: Vec<IndicatorValue> = by_date
            .iter()
            .filter(|(d, _)| **d >= from && **d <= to)
            .flat_map(|(_, vs)| vs.iter().cloned())
            .collect();
        result.sort_by_key(|v| v.date);
        Ok(result)
    }
}

/// Load daily OHLCV candles from a CSV file (`date,open,high,low,close,volume`).
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("failed to open CSV file")?;
    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("failed to read row {}", row_idx + 1))?;

        let date_str = record.get(0).context("missing date column")?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .with_context(|| format!("failed to parse date: {date_str}"))?;

        let open: f64 = record.get(1).context("missing open column")?.parse().context("failed to parse open")?;
        let high: f64 = record.get(2).context("missing high column")?.parse().context("failed to parse high")?;
        let low: f64 = record.get(3).context("missing low column")?.parse().context("failed to parse low")?;
        let close: f64 = record.get(4).context("missing close column")?.parse().context("failed to parse close")?;
        let volume: f64 = record.get(5).context("missing volume column")?.parse().context("failed to parse volume")?;

        candles.push(Candle::new_unchecked(date, open, high, low, close, volume));
    }

    Ok(candles)
}

/// Validate a ticker's candle series for internal consistency.
pub fn validate_candles(candles: &[Candle]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if candles.is_empty() {
        errors.push("no candles provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, candle) in candles.iter().enumerate() {
        if let Err(e) = candle.validate() {
            errors.push(format!("candle {i} ({}): {e}", candle.date));
        }
        if i > 0 && candle.date <= candles[i - 1].date {
            warnings.push(format!("candle {i}: not chronological ({} <= {})", candle.date, candles[i - 1].date));
        }
    }

    ValidationResult { errors, warnings }
}

#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn log(&self) {
        for error in &self.errors {
            tracing::error!("data validation error: {}", error);
        }
        for warning in &self.warnings {
            warn!("data validation warning: {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(date: &str, close: f64) -> Candle {
        let d = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        Candle::new_unchecked(d, close, close + 1.0, close - 1.0, close, 1000.0)
    }

    #[test]
    fn test_trading_days_filters_range() {
        let mut store = InMemoryCandleStore::new();
        let ticker = Symbol::new("005930");
        let candles = vec![candle("2024-01-02", 100.0), candle("2024-01-03", 101.0), candle("2024-01-04", 102.0)];
        store.insert_ticker(ticker, candles);

        let days = store
            .trading_days(
                NaiveDate::parse_from_str("2024-01-03", "%Y-%m-%d").unwrap(),
                NaiveDate::parse_from_str("2024-01-04", "%Y-%m-%d").unwrap(),
            )
            .unwrap();
        assert_eq!(days.len(), 2);
    }

    #[test]
    fn test_unknown_ticker_is_data_unavailable() {
        let store = InMemoryCandleStore::new();
        let ticker = Symbol::new("NOPE");
        let from = NaiveDate::parse_from_str("2024-01-01", "%Y-%m-%d").unwrap();
        let to = NaiveDate::parse_from_str("2024-01-31", "%Y-%m-%d").unwrap();
        let err = store.candles(&ticker, from, to).unwrap_err();
        assert!(matches!(err, EngineError::DataUnavailable { .. }));
    }

    #[test]
    fn test_indicators_available_after_warmup() {
        let mut store = InMemoryCandleStore::new();
        let ticker = Symbol::new("005930");
        let mut candles = Vec::new();
        let mut d = NaiveDate::parse_from_str("2024-01-01", "%Y-%m-%d").unwrap();
        for i in 0..30 {
            candles.push(candle(&d.to_string(), 100.0 + i as f64));
            d = d.succ_opt().unwrap();
        }
        store.insert_ticker(ticker.clone(), candles);

        let values = store
            .indicators(&ticker, NaiveDate::parse_from_str("2024-01-25", "%Y-%m-%d").unwrap(), d)
            .unwrap();
        assert!(values.iter().any(|v| v.kind == IndicatorKind::Sma && v.value.is_some()));
    }

    #[test]
    fn test_validate_candles_detects_inverted_range() {
        let bad = Candle::new_unchecked(
            NaiveDate::parse_from_str("2024-01-02", "%Y-%m-%d").unwrap(),
            100.0,
            90.0,
            95.0,
            92.0,
            1000.0,
        );
        let result = validate_candles(&[bad]);
        assert!(!result.is_valid());
    }
}
