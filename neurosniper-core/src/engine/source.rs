//! Capabilities the engine consumes and exposes.
//!
//! Sources are pulled synchronously; a `Timeout` means "nothing this cycle",
//! not a failure. Observers see every decision, the execution sink only sees
//! decisions that may become real orders.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Candle, CandleEvent, Decision, OiSnapshot, Timeframe};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("no data within the source timeout")]
    Timeout,

    #[error("source disconnected: {0}")]
    Disconnected(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

pub trait CandleSource: Send {
    /// Next closed candle (or gap / end marker) for the series.
    fn next(&mut self, instrument: &str, timeframe: Timeframe) -> Result<CandleEvent, SourceError>;
}

pub trait OpenInterestSource: Send {
    /// Latest option-chain OI snapshot, if the source has one.
    fn latest(&mut self, instrument: &str) -> Result<Option<OiSnapshot>, SourceError>;
}

/// Notification path. Called once per completed aggregation cycle and again
/// when a pending decision is resolved.
pub trait DecisionObserver: Send + Sync {
    fn on_decision(&self, decision: &Decision);
}

/// Order path. Only auto-approved or manually accepted decisions arrive here.
pub trait ExecutionSink: Send + Sync {
    fn execute(&self, decision: &Decision);
}

/// One input to an instrument lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    Candle(Candle),
    Gap {
        instrument: String,
        timeframe: Timeframe,
        from: NaiveDateTime,
        to: NaiveDateTime,
    },
    OpenInterest(OiSnapshot),
}

impl FeedEvent {
    pub fn instrument(&self) -> &str {
        match self {
            FeedEvent::Candle(c) => &c.instrument,
            FeedEvent::Gap { instrument, .. } => instrument,
            FeedEvent::OpenInterest(s) => &s.instrument,
        }
    }

    /// Time at which the event becomes known.
    pub fn available_at(&self) -> NaiveDateTime {
        match self {
            FeedEvent::Candle(c) => c.close_time(),
            FeedEvent::Gap { to, .. } => *to,
            FeedEvent::OpenInterest(s) => s.timestamp,
        }
    }

    /// Convert a pulled candle event; `EndOfStream` has no lane event.
    pub fn from_candle_event(event: CandleEvent) -> Option<Self> {
        match event {
            CandleEvent::Candle(c) => Some(FeedEvent::Candle(c)),
            CandleEvent::Gap {
                instrument,
                timeframe,
                from,
                to,
            } => Some(FeedEvent::Gap {
                instrument,
                timeframe,
                from,
                to,
            }),
            CandleEvent::EndOfStream => None,
        }
    }
}
