//! Bollinger Bands: SMA ± multiplier × population stddev of closes.
//!
//! Bands are separate indicator instances:
//! - Upper: middle + mult * stddev
//! - Lower: middle - mult * stddev
//! - PercentB: (close - lower) / (upper - lower); 0.5 when the bands collapse
//! Window: period.

use super::{trailing, Indicator};
use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Lower,
    PercentB,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64, band: BollingerBand) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        let label = match band {
            BollingerBand::Upper => "upper",
            BollingerBand::Lower => "lower",
            BollingerBand::PercentB => "pctb",
        };
        Self {
            period,
            multiplier,
            band,
            name: format!("bb_{label}_{period}_{multiplier}"),
        }
    }
}

impl Indicator for Bollinger {
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
        let n = self.period as f64;
        let mean = window.iter().map(|c| c.close).sum::<f64>() / n;
        let var = window.iter().map(|c| (c.close - mean).powi(2)).sum::<f64>() / n;
        let width = self.multiplier * var.sqrt();
        let (upper, lower) = (mean + width, mean - width);
        Some(match self.band {
            BollingerBand::Upper => upper,
            BollingerBand::Lower => lower,
            BollingerBand::PercentB => {
                let close = window[window.len() - 1].close;
                if upper - lower <= f64::EPSILON {
                    0.5
                } else {
                    (close - lower) / (upper - lower)
                }
            }
        })
    }
}
