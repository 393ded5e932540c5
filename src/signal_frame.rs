//! Per-(ticker, date) indicator bundles
//!
//! A [`SignalFrame`] carries everything a strategy needs to decide on a
//! given day without touching the candle store again. [`SignalFrameCache`]
//! builds the full set once per session, the way a preload pass builds an
//! in-memory lookup table before the simulation loop starts.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::candle_store::CandleStore;
use crate::indicators::IndicatorKind;
use crate::types::{EngineError, Symbol};

/// All fields a strategy might read for one ticker on one day.
#[derive(Debug, Clone, Default)]
pub struct SignalFrame {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub ma20: Option<f64>,
    pub ma60: Option<f64>,
    pub ma120: Option<f64>,
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub ema120: Option<f64>,
    pub atr20: Option<f64>,
    pub rsi14: Option<f64>,
    pub high10: Option<f64>,
    pub high20: Option<f64>,
    pub ema50_slope: Option<f64>,
}

/// `(ticker, date) -> SignalFrame` lookup, built once per backtest session.
pub struct SignalFrameCache {
    frames: HashMap<(Symbol, NaiveDate), SignalFrame>,
}

impl SignalFrameCache {
    /// Build the cache for `tickers` over `[from, to]` from a candle store.
    pub fn build(
        store: &dyn CandleStore,
        tickers: &[Symbol],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Self, EngineError> {
        let mut frames = HashMap::new();

        for ticker in tickers {
            let candles = store.candles(ticker, from, to)?;
            let indicators = store.indicators(ticker, from, to)?;

            let mut by_date: HashMap<NaiveDate, SignalFrame> = HashMap::new();
            for candle in &candles {
                by_date.insert(
                    candle.date,
                    SignalFrame {
                        date: candle.date,
                        open: candle.open,
                        high: candle.high,
                        low: candle.low,
                        close: candle.close,
                        volume: candle.volume,
                        ..Default::default()
                    },
                );
            }

            for value in indicators {
                let Some(frame) = by_date.get_mut(&value.date) else {
                    continue;
                };
                let period = value.params.period.unwrap_or(0);
                match (value.kind, period) {
                    (IndicatorKind::Sma, 20) => frame.ma20 = value.value,
                    (IndicatorKind::Sma, 60) => frame.ma60 = value.value,
                    (IndicatorKind::Sma, 120) => frame.ma120 = value.value,
                    (IndicatorKind::Ema, 20) => frame.ema20 = value.value,
                    (IndicatorKind::Ema, 50) => frame.ema50 = value.value,
                    (IndicatorKind::Ema, 120) => frame.ema120 = value.value,
                    (IndicatorKind::Atr, 20) => frame.atr20 = value.value,
                    (IndicatorKind::Rsi, 14) => frame.rsi14 = value.value,
                    (IndicatorKind::RollingHigh, 10) => frame.high10 = value.value,
                    (IndicatorKind::RollingHigh, 20) => frame.high20 = value.value,
                    (IndicatorKind::EmaSlope, 50) => frame.ema50_slope = value.value,
                    _ => {}
                }
            }

            for (date, frame) in by_date {
                frames.insert((ticker.clone(), date), frame);
            }
        }

        Ok(Self { frames })
    }

    pub fn get(&self, ticker: &Symbol, date: NaiveDate) -> Option<&SignalFrame> {
        self.frames.get(&(ticker.clone(), date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle_store::InMemoryCandleStore;
    use crate::types::Candle;

    #[test]
    fn test_cache_exposes_raw_candle_fields() {
        let mut store = InMemoryCandleStore::new();
        let ticker = Symbol::new("005930");
        let d = NaiveDate::parse_from_str("2024-01-02", "%Y-%m-%d").unwrap();
        store.insert_ticker(ticker.clone(), vec![Candle::new_unchecked(d, 10.0, 11.0, 9.0, 10.5, 100.0)]);

        let cache = SignalFrameCache::build(&store, &[ticker.clone()], d, d).unwrap();
        let frame = cache.get(&ticker, d).unwrap();
        assert_eq!(frame.close, 10.5);
        assert_eq!(frame.ma20, None);
    }
}
