//! Rate of Change (ROC), in percent.
//!
//! ROC[t] = (close[t] - close[t-period]) / close[t-period] * 100
//! Needs period + 1 candles.

use super::{trailing, Indicator};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    name: String,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ROC period must be >= 1");
        Self {
            period,
            name: format!("roc_{period}"),
        }
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_candles(&self) -> usize {
        self.period + 1
    }

    fn value(&self, candles: &[Candle]) -> Option<f64> {
        if candles.len() < self.min_candles() {
            return None;
        }
        let window = trailing(candles, self.min_candles());
        let base = window[0].close;
        if base == 0.0 {
            return None;
        }
        Some((window[self.period].close - base) / base * 100.0)
    }
}
