//! Fault records shared by every pipeline stage.
//!
//! Faults are reported, never propagated: a fault in one stage degrades
//! that cycle (partial features, suppressed strategy, model fallback) and
//! the lane carries on. Risk rejections are not faults; they are
//! [`DecisionReason`](crate::domain::DecisionReason)s.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::domain::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Missing, late, out-of-order or stale market data.
    Data,
    /// Model failed or timed out; the cycle fell back to indicators only.
    Model,
    /// One strategy failed; its signal was dropped.
    Strategy,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Data => write!(f, "data"),
            FaultKind::Model => write!(f, "model"),
            FaultKind::Strategy => write!(f, "strategy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub instrument: String,
    pub timeframe: Timeframe,
    pub timestamp: NaiveDateTime,
    /// Component that raised it (strategy name, "model", "oi", ...).
    pub source: String,
    pub detail: String,
}

impl Fault {
    pub fn new(
        kind: FaultKind,
        instrument: impl Into<String>,
        timeframe: Timeframe,
        timestamp: NaiveDateTime,
        source: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            instrument: instrument.into(),
            timeframe,
            timestamp,
            source: source.into(),
            detail: detail.into(),
        }
    }

    pub fn log(&self) {
        warn!(
            kind = %self.kind,
            instrument = %self.instrument,
            timeframe = %self.timeframe,
            timestamp = %self.timestamp,
            source = %self.source,
            "{}",
            self.detail
        );
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fault in {} ({} {} @ {}): {}",
            self.kind, self.source, self.instrument, self.timeframe, self.timestamp, self.detail
        )
    }
}
