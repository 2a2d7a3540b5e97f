//! Trap (stop-hunt) detection.
//!
//! A candle within the last `reversal_bars` pierces the extreme of the
//! `lookback` candles before it on elevated volume or range, and the anchor
//! closes back inside the prior range. An upside sweep baits longs
//! (`hunted_side = Long`); a downside sweep baits shorts.

use serde::{Deserialize, Serialize};

use super::{DetectionInput, Pattern, PatternDetector, PatternKind};
use crate::domain::{Candle, Direction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
    pub lookback: usize,
    pub reversal_bars: usize,
    pub volume_multiple: f64,
    pub range_multiple: f64,
    /// Candles during which entries on the hunted side are blocked.
    pub cooldown_bars: usize,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            reversal_bars: 3,
            volume_multiple: 1.5,
            range_multiple: 1.5,
            cooldown_bars: 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrapDetector {
    config: TrapConfig,
}

struct PriorRange {
    high: f64,
    low: f64,
    avg_volume: f64,
    avg_range: f64,
}

impl PriorRange {
    fn of(candles: &[Candle]) -> Self {
        let n = candles.len().max(1) as f64;
        Self {
            high: candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max),
            low: candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min),
            avg_volume: candles.iter().map(|c| c.volume).sum::<f64>() / n,
            avg_range: candles.iter().map(Candle::range).sum::<f64>() / n,
        }
    }
}

impl TrapDetector {
    pub fn new(config: TrapConfig) -> Self {
        Self { config }
    }

    /// Volume/range participation score of the excursion candle, or `None`
    /// if it does not clear either threshold.
    fn participation(&self, candle: &Candle, prior: &PriorRange) -> Option<f64> {
        let vol_ratio = if prior.avg_volume > 0.0 {
            candle.volume / prior.avg_volume
        } else {
            0.0
        };
        let range_ratio = if prior.avg_range > 0.0 {
            candle.range() / prior.avg_range
        } else {
            0.0
        };
        let vol_hit = vol_ratio >= self.config.volume_multiple;
        let range_hit = range_ratio >= self.config.range_multiple;
        if !vol_hit && !range_hit {
            return None;
        }
        let score = (vol_ratio / (2.0 * self.config.volume_multiple))
            .max(range_ratio / (2.0 * self.config.range_multiple));
        Some(score.clamp(0.0, 1.0))
    }
}

impl PatternDetector for TrapDetector {
    fn name(&self) -> &str {
        "trap"
    }

    fn lookback(&self) -> usize {
        self.config.lookback + self.config.reversal_bars
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Pattern> {
        let candles = input.candles;
        let n = candles.len();
        if self.config.lookback == 0 || n < self.lookback() {
            return Vec::new();
        }
        let anchor = &candles[n - 1];
        let mut found: Vec<Pattern> = Vec::new();

        // newest excursion first; at most one trap per side
        for offset in 0..self.config.reversal_bars.max(1) {
            let e = n - 1 - offset;
            if e < self.config.lookback {
                break;
            }
            let excursion = &candles[e];
            let prior = PriorRange::of(&candles[e - self.config.lookback..e]);
            let Some(strength) = self.participation(excursion, &prior) else {
                continue;
            };

            let swept = if excursion.high > prior.high && anchor.close < prior.high {
                Some((Direction::Long, prior.high, excursion.high))
            } else if excursion.low < prior.low && anchor.close > prior.low {
                Some((Direction::Short, excursion.low, prior.low))
            } else {
                None
            };

            if let Some((hunted_side, low, high)) = swept {
                let already = found.iter().any(|p| {
                    matches!(p.kind, PatternKind::Trap { hunted_side: side } if side == hunted_side)
                });
                if !already {
                    found.push(Pattern {
                        kind: PatternKind::Trap { hunted_side },
                        instrument: anchor.instrument.clone(),
                        timeframe: anchor.timeframe,
                        detected_at: anchor.close_time(),
                        origin: excursion.timestamp,
                        low,
                        high,
                        strength,
                        expires_after_bars: self.config.cooldown_bars,
                    });
                }
            }
        }
        found
    }
}
