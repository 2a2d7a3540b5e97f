//! Pattern Detectors: structural setups found in a candle window.
//!
//! Detectors are pure: they read only the window handed to them (ending at
//! the anchor candle) and an OI snapshot stamped no later than the anchor.
//! Patterns that stay relevant across candles live in a [`PatternTracker`]
//! with an explicit validity window.

pub mod fvg;
pub mod oi;
pub mod tracker;
pub mod trap;

pub use fvg::{FvgConfig, FvgDetector};
pub use oi::{OiAnalyzer, OiConfig};
pub use tracker::PatternTracker;
pub use trap::{TrapConfig, TrapDetector};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Direction, OiSnapshot, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OiLevel {
    Support,
    Resistance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternKind {
    /// Three-candle imbalance; `bias` is Long for a bullish gap.
    FairValueGap { bias: Direction },
    /// Liquidity sweep that reversed; `hunted_side` is the side the fake move baited.
    Trap { hunted_side: Direction },
    /// Put/call ratio outside the neutral band.
    OiSkew { pcr: f64, bias: Direction },
    /// Heaviest OI strike on one side of spot.
    OiBuildup { strike: i64, level: OiLevel },
}

impl PatternKind {
    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::FairValueGap { .. } => "fvg",
            PatternKind::Trap { .. } => "trap",
            PatternKind::OiSkew { .. } => "oi_skew",
            PatternKind::OiBuildup { .. } => "oi_buildup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub instrument: String,
    pub timeframe: Timeframe,
    /// Anchor at which the pattern was first detected.
    pub detected_at: NaiveDateTime,
    /// Timestamp of the candle (or snapshot) that formed the pattern.
    pub origin: NaiveDateTime,
    pub low: f64,
    pub high: f64,
    /// In [0, 1].
    pub strength: f64,
    /// Candles after detection during which the pattern stays active.
    pub expires_after_bars: usize,
}

impl Pattern {
    /// Identity used to deduplicate re-detections of the same setup.
    pub fn key(&self) -> String {
        match &self.kind {
            PatternKind::FairValueGap { bias } => format!("fvg:{bias}:{}", self.origin),
            PatternKind::Trap { hunted_side } => format!("trap:{hunted_side}:{}", self.origin),
            // one live skew / one level per side at a time
            PatternKind::OiSkew { .. } => "oi_skew".to_string(),
            PatternKind::OiBuildup { level, .. } => format!("oi_buildup:{level:?}"),
        }
    }

    /// Directional bias implied by the pattern, if any.
    pub fn bias(&self) -> Direction {
        match &self.kind {
            PatternKind::FairValueGap { bias } | PatternKind::OiSkew { bias, .. } => *bias,
            PatternKind::Trap { hunted_side } => hunted_side.opposite(),
            PatternKind::OiBuildup { level, .. } => match level {
                OiLevel::Support => Direction::Long,
                OiLevel::Resistance => Direction::Short,
            },
        }
    }

    /// True once a later candle has voided the setup.
    pub fn is_invalidated_by(&self, candle: &Candle) -> bool {
        match &self.kind {
            PatternKind::FairValueGap { bias: Direction::Long } => candle.low < self.low,
            PatternKind::FairValueGap { bias: Direction::Short } => candle.high > self.high,
            _ => false,
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// What a detector may look at: candles up to the anchor and, optionally,
/// the latest OI snapshot.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub candles: &'a [Candle],
    pub oi: Option<&'a OiSnapshot>,
}

impl<'a> DetectionInput<'a> {
    pub fn candles(candles: &'a [Candle]) -> Self {
        Self { candles, oi: None }
    }

    pub fn with_oi(mut self, oi: Option<&'a OiSnapshot>) -> Self {
        self.oi = oi;
        self
    }

    pub fn anchor(&self) -> Option<NaiveDateTime> {
        self.candles.last().map(Candle::close_time)
    }
}

/// Trait for pattern detectors.
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Candles of history the detector needs.
    fn lookback(&self) -> usize;

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Pattern>;
}

/// Detectors built from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub fvg: FvgConfig,
    pub trap: TrapConfig,
    pub oi: OiConfig,
}

impl PatternConfig {
    pub fn build(&self) -> Vec<Box<dyn PatternDetector>> {
        vec![
            Box::new(FvgDetector::new(self.fvg.clone())),
            Box::new(TrapDetector::new(self.trap.clone())),
            Box::new(OiAnalyzer::new(self.oi.clone())),
        ]
    }
}
