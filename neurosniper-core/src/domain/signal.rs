use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::direction::Direction;
use super::timeframe::Timeframe;

/// A directional proposal from one strategy, before aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub timestamp: NaiveDateTime,
    pub strategy: String,
    pub direction: Direction,
    /// Reference entry price (the anchor candle's close).
    pub entry: f64,
    pub target: Option<f64>,
    pub stop: Option<f64>,
    /// In [0, 1].
    pub confidence: f64,
}

impl CandidateSignal {
    /// Ordering key used wherever signals are attached to a decision.
    pub fn sort_key(&self) -> (Timeframe, &str) {
        (self.timeframe, self.strategy.as_str())
    }
}
