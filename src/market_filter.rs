//! Broad-market regime gate
//!
//! Checked once per day before any per-ticker signal scan. Built on the
//! same [`SignalFrameCache`] machinery used for tradable tickers, applied
//! to a fixed pair of index symbols.

use chrono::NaiveDate;

use crate::signal_frame::SignalFrameCache;
use crate::types::Symbol;

/// Default structure-ok slope threshold: both indices' EMA50 slope must be
/// at least this value.
pub const DEFAULT_STRUCTURE_SLOPE_THRESHOLD: f64 = -0.2;

/// Broad market index filter: is the market bullish, and is its structure intact.
pub struct MarketFilter {
    indices: Vec<Symbol>,
    cache: SignalFrameCache,
    structure_slope_threshold: f64,
}

impl MarketFilter {
    pub fn new(indices: Vec<Symbol>, cache: SignalFrameCache) -> Self {
        Self {
            indices,
            cache,
            structure_slope_threshold: DEFAULT_STRUCTURE_SLOPE_THRESHOLD,
        }
    }

    pub fn with_structure_slope_threshold(mut self, threshold: f64) -> Self {
        self.structure_slope_threshold = threshold;
        self
    }

    /// All configured indices are above their 60-day SMA.
    pub fn is_bullish(&self, date: NaiveDate) -> bool {
        self.indices.iter().all(|idx| {
            self.cache
                .get(idx, date)
                .and_then(|f| f.close.partial_cmp(&f.ma60.unwrap_or(f64::MAX)).map(|o| o.is_gt()))
                .unwrap_or(false)
        })
    }

    /// All configured indices have an EMA50 slope at or above the threshold.
    pub fn is_structure_ok(&self, date: NaiveDate) -> bool {
        self.indices.iter().all(|idx| {
            self.cache
                .get(idx, date)
                .and_then(|f| f.ema50_slope)
                .map(|slope| slope >= self.structure_slope_threshold)
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle_store::InMemoryCandleStore;
    use crate::types::Candle;

    fn candle(date: NaiveDate, close: f64) -> Candle {
        Candle::new_unchecked(date, close, close + 1.0, close - 1.0, close, 1_000_000.0)
    }

    #[test]
    fn test_bullish_requires_both_indices_above_ma60() {
        let mut store = InMemoryCandleStore::new();
        let kospi = Symbol::new("KS11");
        let kosdaq = Symbol::new("KQ11");

        let mut candles = Vec::new();
        let mut d = NaiveDate::parse_from_str("2024-01-01", "%Y-%m-%d").unwrap();
        for i in 0..65 {
            candles.push(candle(d, 1000.0 + i as f64));
            d = d.succ_opt().unwrap();
        }
        store.insert_ticker(kospi.clone(), candles.clone());
        store.insert_ticker(kosdaq.clone(), candles);

        let last_day = d.pred_opt().unwrap();
        let cache = SignalFrameCache::build(
            &store,
            &[kospi.clone(), kosdaq.clone()],
            NaiveDate::parse_from_str("2024-01-01", "%Y-%m-%d").unwrap(),
            last_day,
        )
        .unwrap();

        let filter = MarketFilter::new(vec![kospi, kosdaq], cache);
        assert!(filter.is_bullish(last_day));
    }

    #[test]
    fn test_missing_index_data_is_not_bullish() {
        let store = InMemoryCandleStore::new();
        let kospi = Symbol::new("KS11");
        let d = NaiveDate::parse_from_str("2024-01-01", "%Y-%m-%d").unwrap();
        let cache = SignalFrameCache::build(&store, &[], d, d).unwrap();
        let filter = MarketFilter::new(vec![kospi], cache);
        assert!(!filter.is_bullish(d));
    }
}
