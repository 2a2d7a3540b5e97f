//! NeuroSniper Core: the signal decision pipeline for intraday index derivatives.
//!
//! This crate holds everything between a closed candle and a risk-checked decision:
//! - Domain types (candles, signals, decisions, positions, OI snapshots)
//! - Indicators evaluated over fixed trailing windows, assembled into feature sets
//! - Pattern detectors (fair value gaps, liquidity traps, OI skew and buildup)
//! - A swappable prediction model behind a versioned store
//! - Stateless strategies built from configuration and run in isolation
//! - The signal aggregator and the risk gate
//! - Instrument lanes, shared by the live engine and the replay runner

pub mod aggregate;
pub mod domain;
pub mod engine;
pub mod error;
pub mod features;
pub mod indicators;
pub mod patterns;
pub mod prediction;
pub mod risk;
pub mod strategy;
