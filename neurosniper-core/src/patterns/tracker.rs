//! Active pattern cache with explicit time-to-live.

use serde::{Deserialize, Serialize};

use super::{Pattern, PatternKind};
use crate::domain::{Candle, Direction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tracked {
    pattern: Pattern,
    age_bars: usize,
}

/// Patterns still inside their validity window for one lane and timeframe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternTracker {
    active: Vec<Tracked>,
}

impl PatternTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Age every pattern by one candle and drop expired or invalidated ones.
    ///
    /// Call with the new anchor candle before merging this cycle's detections.
    pub fn advance(&mut self, candle: &Candle) {
        for tracked in &mut self.active {
            tracked.age_bars += 1;
        }
        self.active.retain(|t| {
            t.age_bars <= t.pattern.expires_after_bars && !t.pattern.is_invalidated_by(candle)
        });
    }

    /// Merge fresh detections. A re-detection replaces the older copy and
    /// restarts its window.
    pub fn extend(&mut self, fresh: impl IntoIterator<Item = Pattern>) {
        for pattern in fresh {
            let key = pattern.key();
            self.active.retain(|t| t.pattern.key() != key);
            self.active.push(Tracked {
                pattern,
                age_bars: 0,
            });
        }
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        self.active.iter().map(|t| t.pattern.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// True while an active trap baited `direction`.
    pub fn cooldown_blocks(&self, direction: Direction) -> bool {
        self.active.iter().any(|t| {
            matches!(t.pattern.kind, PatternKind::Trap { hunted_side } if hunted_side == direction)
        })
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}
