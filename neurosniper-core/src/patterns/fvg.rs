//! Fair value gap detection.
//!
//! Three consecutive candles c1, c2, c3 (c3 = anchor):
//! - bullish gap when c3.low > c1.high, zone [c1.high, c3.low]
//! - bearish gap when c3.high < c1.low, zone [c3.high, c1.low]
//! The gap is invalidated once a later candle trades through the far edge.

use serde::{Deserialize, Serialize};

use super::{DetectionInput, Pattern, PatternDetector, PatternKind};
use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FvgConfig {
    /// Minimum gap size as a percentage of the middle candle's close.
    pub min_gap_pct: f64,
    pub expiry_bars: usize,
}

impl Default for FvgConfig {
    fn default() -> Self {
        Self {
            min_gap_pct: 0.02,
            expiry_bars: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FvgDetector {
    config: FvgConfig,
}

impl FvgDetector {
    pub fn new(config: FvgConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for FvgDetector {
    fn name(&self) -> &str {
        "fvg"
    }

    fn lookback(&self) -> usize {
        3
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Pattern> {
        let n = input.candles.len();
        if n < 3 {
            return Vec::new();
        }
        let (c1, c2, c3) = (&input.candles[n - 3], &input.candles[n - 2], &input.candles[n - 1]);

        let (bias, low, high) = if c3.low > c1.high {
            (Direction::Long, c1.high, c3.low)
        } else if c3.high < c1.low {
            (Direction::Short, c3.high, c1.low)
        } else {
            return Vec::new();
        };

        let gap = high - low;
        if c2.close <= 0.0 || gap / c2.close * 100.0 < self.config.min_gap_pct {
            return Vec::new();
        }
        let strength = if c2.range() > 0.0 {
            (gap / c2.range()).clamp(0.0, 1.0)
        } else {
            0.0
        };

        vec![Pattern {
            kind: PatternKind::FairValueGap { bias },
            instrument: c3.instrument.clone(),
            timeframe: c3.timeframe,
            detected_at: c3.close_time(),
            origin: c2.timestamp,
            low,
            high,
            strength,
            expires_after_bars: self.config.expiry_bars,
        }]
    }
}
