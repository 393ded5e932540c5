//! Technical indicators
//!
//! Pure functions over oldest-first price vectors. All indicator math stays
//! in `f64`; only ledger values use [`crate::Money`].

use serde::{Deserialize, Serialize};

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else {
            let sum: f64 = values[i + 1 - period..=i].iter().sum();
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Calculate Exponential Moving Average, seeded with SMA(period)
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    if values.is_empty() || period == 0 {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_value: Option<f64> = None;

    for (i, &value) in values.iter().enumerate() {
        if i < period - 1 {
            result.push(None);
        } else if i == period - 1 {
            let sum: f64 = values[0..period].iter().sum();
            ema_value = Some(sum / period as f64);
            result.push(ema_value);
        } else if let Some(prev_ema) = ema_value {
            let new_ema = (value - prev_ema) * multiplier + prev_ema;
            ema_value = Some(new_ema);
            result.push(Some(new_ema));
        }
    }

    result
}

/// Calculate True Range
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Wilder's smoothing: seeded with the SMA of the first `period` values,
/// then `new = (prev * (period - 1) + value) / period`. Distinct from
/// [`ema`]'s `2/(period+1)` multiplier.
fn wilder_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    if values.is_empty() || period == 0 {
        return result;
    }

    let mut smoothed: Option<f64> = None;

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else if i + 1 == period {
            let sum: f64 = values[0..period].iter().sum();
            smoothed = Some(sum / period as f64);
            result.push(smoothed);
        } else if let Some(prev) = smoothed {
            let new_value = (prev * (period - 1) as f64 + values[i]) / period as f64;
            smoothed = Some(new_value);
            result.push(smoothed);
        } else {
            result.push(None);
        }
    }

    result
}

/// Average True Range via Wilder smoothing of True Range
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(high, low, close);
    wilder_smooth(&tr, period)
}

/// Wilder's RSI, 0..100
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());

    gains.push(0.0);
    losses.push(0.0);

    for i in 1..values.len() {
        let change = values[i] - values[i - 1];
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let avg_gains = wilder_smooth(&gains, period);
    let avg_losses = wilder_smooth(&losses, period);

    let mut rsi_values = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if let (Some(avg_gain), Some(avg_loss)) = (avg_gains[i], avg_losses[i]) {
            if avg_loss == 0.0 {
                rsi_values.push(Some(100.0));
            } else {
                let rs = avg_gain / avg_loss;
                let rsi_val = 100.0 - (100.0 / (1.0 + rs));
                rsi_values.push(Some(rsi_val));
            }
        } else {
            rsi_values.push(None);
        }
    }

    rsi_values
}

/// Rolling high over the `period` closes strictly before today.
///
/// `result[i] = max(values[i-period..i])` for `i >= period`; today's own
/// value never enters the window, so a breakout can only be measured
/// against prior closes.
pub fn rolling_high_excluding_today(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];

    for i in period..values.len() {
        let window = &values[i - period..i];
        let max = window.iter().cloned().fold(f64::MIN, f64::max);
        result[i] = Some(max);
    }

    result
}

/// Slope of an EMA normalized by ATR: `(ema[i] - ema[i-1]) / atr[i]`.
///
/// `None` where either EMA value is missing or ATR is missing/non-positive.
pub fn ema_slope(closes: &[f64], ema_period: usize, atr_period: usize, atr_values: &[Option<f64>]) -> Vec<Option<f64>> {
    let ema_values = ema(closes, ema_period);
    let mut result = vec![None; closes.len()];

    for i in 1..closes.len() {
        if i >= atr_values.len() {
            continue;
        }
        if let (Some(e), Some(prev_e), Some(a)) = (ema_values[i], ema_values[i - 1], atr_values[i]) {
            if a > 0.0 {
                result[i] = Some((e - prev_e) / a);
            }
        }
    }

    let _ = atr_period;
    result
}

/// Trend stage classification from the relative ordering of three EMAs.
///
/// Stages (matching the textual table): 1 short>medium>long (full uptrend),
/// 2 medium>short>long, 3 medium>long>short, 4 long>medium>short (full
/// downtrend), 5 long>short>medium, 6 short>long>medium. `None` if any value
/// is missing or two compared values tie.
pub fn ema_stage(short: Option<f64>, medium: Option<f64>, long: Option<f64>) -> Option<u8> {
    let (s, m, l) = (short?, medium?, long?);
    if s == m || m == l || s == l {
        return None;
    }
    let stage = if s > m && m > l {
        1
    } else if m > s && s > l {
        2
    } else if m > l && l > s {
        3
    } else if l > m && m > s {
        4
    } else if l > s && s > m {
        5
    } else {
        6
    };
    Some(stage)
}

/// Kind of indicator value, used as part of a storage key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Atr,
    Rsi,
    RollingHigh,
    EmaSlope,
    EmaStage,
}

/// Canonical parameter set for an indicator computation, serialized with
/// sorted keys so `(ticker, date, kind, params)` is a stable storage key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub period: Option<u32>,
    pub secondary_period: Option<u32>,
}

impl IndicatorParams {
    pub fn period(period: u32) -> Self {
        Self {
            period: Some(period),
            secondary_period: None,
        }
    }

    /// Canonical encoding: serde_json's map serialization already emits
    /// struct fields in declaration order, which we've declared sorted.
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A single computed indicator value, addressable by `(ticker, date, kind, params)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub ticker: crate::types::Symbol,
    pub date: chrono::NaiveDate,
    pub kind: IndicatorKind,
    pub params: IndicatorParams,
    pub value: Option<f64>,
}
