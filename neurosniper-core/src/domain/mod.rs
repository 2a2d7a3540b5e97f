//! Domain types for NeuroSniper

pub mod candle;
pub mod decision;
pub mod direction;
pub mod ids;
pub mod instrument;
pub mod market;
pub mod oi;
pub mod position;
pub mod signal;
pub mod timeframe;

pub use candle::{check_append, resample, Candle, CandleEvent, CandleSeries, SeriesError};
pub use decision::{decision_digest, Decision, DecisionReason, DecisionStatus, TradingMode};
pub use direction::Direction;
pub use ids::{ConfigHash, DatasetHash, DecisionId, ModelVersion, RunFingerprint};
pub use instrument::Instrument;
pub use market::{InstrumentView, MarketSnapshot};
pub use oi::{OiSnapshot, StrikeOi};
pub use position::{ExitReason, Position, PositionState};
pub use signal::CandidateSignal;
pub use timeframe::Timeframe;
