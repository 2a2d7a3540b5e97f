//! Technical indicators over a trailing candle window.
//!
//! Every indicator is a pure function of the last `window()` candles it is
//! handed: two histories that end in the same window produce the same value.
//! Recursive indicators (EMA, Wilder RSI/ATR) are therefore seeded inside
//! their window rather than carried across the whole history, which also
//! bounds the per-candle cost by the lookback instead of the history length.
//!
//! A window shorter than `min_candles()` has no value; callers mark the
//! feature unavailable instead of substituting zero.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod volume_ratio;
pub mod vwap;

pub use atr::Atr;
pub use bollinger::{Bollinger, BollingerBand};
pub use ema::{Ema, EmaSpread};
pub use roc::Roc;
pub use rsi::Rsi;
pub use sma::Sma;
pub use volume_ratio::VolumeRatio;
pub use vwap::Vwap;

use crate::domain::Candle;

/// Trait for indicators.
///
/// # Look-ahead guard
/// `value` sees only candles up to and including the anchor. No value at
/// candle t may depend on candle t+1 or later; `compute` exists so tests can
/// compare truncated and full series.
pub trait Indicator: Send + Sync {
    /// Feature name (e.g., "rsi_14", "atr_14").
    fn name(&self) -> &str;

    /// Number of candles needed before a value exists.
    fn min_candles(&self) -> usize;

    /// Number of trailing candles the value is computed over.
    fn window(&self) -> usize {
        self.min_candles()
    }

    /// Value at the last candle of `candles`, or `None` when too short.
    fn value(&self, candles: &[Candle]) -> Option<f64>;

    /// Value at every index of `candles` (NaN where unavailable).
    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        (0..candles.len())
            .map(|i| self.value(&candles[..=i]).unwrap_or(f64::NAN))
            .collect()
    }
}

/// The trailing `n` candles of `candles`.
pub fn trailing(candles: &[Candle], n: usize) -> &[Candle] {
    &candles[candles.len().saturating_sub(n)..]
}

/// Standard feature names used across strategies and the default model.
pub mod names {
    pub const CLOSE: &str = "close";
    pub const RSI: &str = "rsi_14";
    pub const EMA_FAST: &str = "ema_9";
    pub const EMA_SLOW: &str = "ema_21";
    pub const EMA_SPREAD: &str = "ema_spread_9_21";
    pub const ATR: &str = "atr_14";
    pub const SMA: &str = "sma_20";
    pub const BB_UPPER: &str = "bb_upper_20_2";
    pub const BB_LOWER: &str = "bb_lower_20_2";
    pub const BB_PCTB: &str = "bb_pctb_20_2";
    pub const ROC: &str = "roc_10";
    pub const VWAP: &str = "vwap_20";
    pub const VOLUME_RATIO: &str = "volume_ratio_20";
}

/// The indicator set every lane computes.
pub fn standard_set() -> Vec<Box<dyn Indicator>> {
    vec![
        Box::new(Rsi::new(14)),
        Box::new(Ema::new(9)),
        Box::new(Ema::new(21)),
        Box::new(EmaSpread::new(9, 21)),
        Box::new(Atr::new(14)),
        Box::new(Sma::new(20)),
        Box::new(Bollinger::new(20, 2.0, BollingerBand::Upper)),
        Box::new(Bollinger::new(20, 2.0, BollingerBand::Lower)),
        Box::new(Bollinger::new(20, 2.0, BollingerBand::PercentB)),
        Box::new(Roc::new(10)),
        Box::new(Vwap::new(20)),
        Box::new(VolumeRatio::new(20)),
    ]
}

/// Create synthetic 5-minute candles from close prices for testing.
///
/// open = prev close (or close for the first candle), high/low = max/min of
/// open and close ± 1.0, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use crate::domain::Timeframe;
    let start = chrono::NaiveDate::from_ymd_opt(2025, 5, 2)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                instrument: "NIFTY".to_string(),
                timeframe: Timeframe::M5,
                timestamp: start + chrono::Duration::minutes(5 * i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
                open_interest: None,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
