//! Rolling volume-weighted average price.
//!
//! VWAP = Σ(typical × volume) / Σ volume over the last `period` candles,
//! typical = (high + low + close) / 3. Unavailable when the window traded
//! no volume.
//! Window: period.

use super::{trailing, Indicator};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Vwap {
    period: usize,
    name: String,
}

impl Vwap {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "VWAP period must be >= 1");
        Self {
            period,
            name: format!("vwap_{period}"),
        }
    }
}

impl Indicator for Vwap {
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
        let (pv, vol) = trailing(candles, self.period)
            .iter()
            .fold((0.0, 0.0), |(pv, vol), c| {
                let typical = (c.high + c.low + c.close) / 3.0;
                (pv + typical * c.volume, vol + c.volume)
            });
        if vol <= 0.0 {
            None
        } else {
            Some(pv / vol)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn vwap_weights_by_volume() {
        let mut candles = make_candles(&[100.0, 100.0]);
        candles[1].high = 211.0;
        candles[1].low = 209.0;
        candles[1].close = 210.0;
        candles[1].volume = 3000.0;
        // typical 100 (vol 1000) and 210 (vol 3000)
        let expected = (100.0 * 1000.0 + 210.0 * 3000.0) / 4000.0;
        assert_approx(Vwap::new(2).value(&candles).unwrap(), expected, DEFAULT_EPSILON);
    }

    #[test]
    fn vwap_without_volume_is_unavailable() {
        let mut candles = make_candles(&[100.0, 101.0]);
        for c in &mut candles {
            c.volume = 0.0;
        }
        assert!(Vwap::new(2).value(&candles).is_none());
    }
}
