//! Simple Moving Average (SMA) of closes.
//!
//! SMA[t] = mean(close[t-period+1..=t])
//! Window: period.

use super::{trailing, Indicator};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_candles(&self) -> usize {
        self.period
    }

    fn value(&self, candles: &[Candle]) -> Option<f64> {
        if candles.len() < self.period {
            return None;
        }
        let window = trailing(candles, self.period);
        Some(window.iter().map(|c| c.close).sum::<f64>() / self.period as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn sma_basic() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let values = Sma::new(3).compute(&candles);
        assert!(values[0].is_nan());
        assert!(values[1].is_nan());
        assert_approx(values[2], 2.0, DEFAULT_EPSILON);
        assert_approx(values[4], 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_short_window_is_unavailable() {
        let candles = make_candles(&[1.0, 2.0]);
        assert_eq!(Sma::new(3).value(&candles), None);
    }
}
