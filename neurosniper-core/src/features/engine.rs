//! Incremental feature computation over a bounded candle buffer.

use std::sync::Arc;

use tracing::debug;

use super::feature_set::{FeatureSet, FeatureValue};
use crate::domain::{check_append, Candle, SeriesError, Timeframe};
use crate::indicators::{names, Indicator};

/// Shared, immutable indicator list. One copy serves every lane.
pub type IndicatorSet = Arc<Vec<Box<dyn Indicator>>>;

/// Per-(instrument, timeframe) feature state.
///
/// Holds the trailing candles needed by the longest indicator window (and
/// by pattern detectors, via `extra_history`). Appending a candle
/// re-evaluates each indicator on its own trailing window only.
pub struct FeatureEngine {
    instrument: String,
    timeframe: Timeframe,
    indicators: IndicatorSet,
    capacity: usize,
    buffer: Vec<Candle>,
    warmup: usize,
}

impl FeatureEngine {
    pub fn new(
        instrument: impl Into<String>,
        timeframe: Timeframe,
        indicators: IndicatorSet,
        extra_history: usize,
    ) -> Self {
        let window = indicators.iter().map(|i| i.window()).max().unwrap_or(1);
        let warmup = indicators.iter().map(|i| i.min_candles()).max().unwrap_or(1);
        Self {
            instrument: instrument.into(),
            timeframe,
            indicators,
            capacity: window.max(extra_history).max(1),
            buffer: Vec::new(),
            warmup,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Candles required before every indicator has a value.
    pub fn warmup_candles(&self) -> usize {
        self.warmup
    }

    pub fn is_warm(&self) -> bool {
        self.buffer.len() >= self.warmup
    }

    pub fn candles_until_warm(&self) -> usize {
        self.warmup.saturating_sub(self.buffer.len())
    }

    /// Trailing candles, oldest first, ending at the latest pushed candle.
    pub fn window(&self) -> &[Candle] {
        let start = self.buffer.len().saturating_sub(self.capacity);
        &self.buffer[start..]
    }

    pub fn last(&self) -> Option<&Candle> {
        self.buffer.last()
    }

    /// Append one closed candle and return the features at its close.
    pub fn push(&mut self, candle: Candle) -> Result<FeatureSet, SeriesError> {
        check_append(&self.instrument, self.timeframe, self.buffer.last(), &candle)?;
        self.buffer.push(candle);
        // amortized trim keeps the buffer within 2x capacity
        if self.buffer.len() >= self.capacity * 2 {
            let excess = self.buffer.len() - self.capacity;
            self.buffer.drain(..excess);
        }
        Ok(self.features())
    }

    /// Drop buffered candles after a gap; features go unavailable until re-warmed.
    pub fn invalidate(&mut self) {
        if !self.buffer.is_empty() {
            debug!(
                instrument = %self.instrument,
                timeframe = %self.timeframe,
                dropped = self.buffer.len(),
                "feature window invalidated"
            );
        }
        self.buffer.clear();
    }

    /// Features at the latest candle.
    pub fn features(&self) -> FeatureSet {
        compute_features(&self.instrument, self.timeframe, &self.indicators, self.window())
    }
}

/// Pure feature computation for a window ending at its last candle.
pub fn compute_features(
    instrument: &str,
    timeframe: Timeframe,
    indicators: &[Box<dyn Indicator>],
    window: &[Candle],
) -> FeatureSet {
    let anchor = match window.last() {
        Some(last) => last.close_time(),
        None => chrono::NaiveDateTime::MIN,
    };
    let mut set = FeatureSet::new(instrument, timeframe, anchor);
    if let Some(last) = window.last() {
        set.set(names::CLOSE, last.close);
    } else {
        set.insert(names::CLOSE, FeatureValue::Unavailable { required: 1, have: 0 });
    }
    for indicator in indicators {
        let value = match indicator.value(window) {
            Some(v) if v.is_finite() => FeatureValue::Available { value: v },
            _ => FeatureValue::Unavailable {
                required: indicator.min_candles(),
                have: window.len(),
            },
        };
        set.insert(indicator.name(), value);
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_candles, standard_set, Rsi, Sma};

    fn engine(indicators: Vec<Box<dyn Indicator>>) -> FeatureEngine {
        FeatureEngine::new("NIFTY", Timeframe::M5, Arc::new(indicators), 0)
    }

    #[test]
    fn short_window_marks_unavailable() {
        let mut fe = engine(vec![Box::new(Sma::new(5)), Box::new(Rsi::new(14))]);
        let mut last = None;
        for c in make_candles(&[100.0, 101.0, 102.0]) {
            last = Some(fe.push(c).unwrap());
        }
        let fs = last.unwrap();
        assert_eq!(fs.get("close"), Some(102.0));
        assert_eq!(
            fs.state("rsi_14"),
            Some(&FeatureValue::Unavailable { required: 15, have: 3 })
        );
        assert!(fs.get("sma_5").is_none());
        assert!(!fe.is_warm());
        assert_eq!(fe.candles_until_warm(), 12);
    }

    #[test]
    fn anchor_is_last_close_time() {
        let candles = make_candles(&[100.0, 101.0]);
        let mut fe = engine(vec![Box::new(Sma::new(2))]);
        fe.push(candles[0].clone()).unwrap();
        let fs = fe.push(candles[1].clone()).unwrap();
        assert_eq!(fs.anchor, candles[1].close_time());
    }

    #[test]
    fn out_of_order_push_is_rejected_and_state_kept() {
        let candles = make_candles(&[100.0, 101.0]);
        let mut fe = engine(vec![Box::new(Sma::new(2))]);
        fe.push(candles[1].clone()).unwrap();
        assert!(fe.push(candles[0].clone()).is_err());
        assert_eq!(fe.window().len(), 1);
    }

    #[test]
    fn incremental_matches_batch() {
        let closes: Vec<f64> = (0..300).map(|i| 100.0 + ((i * 7) % 13) as f64).collect();
        let candles = make_candles(&closes);
        let set: IndicatorSet = Arc::new(standard_set());
        let mut fe = FeatureEngine::new("NIFTY", Timeframe::M5, set.clone(), 0);
        let mut streamed = None;
        for c in candles.iter().cloned() {
            streamed = Some(fe.push(c).unwrap());
        }
        let batch = compute_features("NIFTY", Timeframe::M5, &set, &candles);
        assert_eq!(streamed.unwrap(), batch);
        // buffer stays bounded
        assert!(fe.buffer.len() < fe.capacity * 2);
    }

    #[test]
    fn invalidate_forces_rewarm() {
        let mut fe = engine(vec![Box::new(Sma::new(3))]);
        for c in make_candles(&[1.0, 2.0, 3.0]) {
            fe.push(c).unwrap();
        }
        assert!(fe.is_warm());
        fe.invalidate();
        assert!(!fe.is_warm());
        assert!(fe.window().is_empty());
    }
}
