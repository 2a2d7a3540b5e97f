//! NeuroSniper Runner: historical replay, metrics, training and run history.
//!
//! This crate builds on `neurosniper-core` to provide:
//! - TOML backtest configuration
//! - Candle and OI loading from CSV, or seeded synthetic sessions
//! - Historical feeds, both as a pre-ordered event list and as a live-style source
//! - The replay engine and performance metrics
//! - Model retraining and model files
//! - Run fingerprinting, determinism checks and a JSONL run store

pub mod config;
pub mod data_loader;
pub mod feed;
pub mod metrics;
pub mod replay;
pub mod runner;
pub mod store;
pub mod training;

pub use config::{BacktestConfig, ConfigError, DataConfig};
pub use data_loader::{compute_dataset_hash, generate_synthetic, load_market_data, LoadError, MarketData};
pub use feed::{HistoricalFeed, HistoricalSource};
pub use metrics::PerformanceMetrics;
pub use replay::{EquityPoint, Replay, ReplayOutcome, ReplayPhase};
pub use runner::{
    record_run, run_backtest, run_backtest_on_data, run_backtests, verify_determinism, BacktestRun, RunError,
    SCHEMA_VERSION,
};
pub use store::{PositionRecord, RunQuery, RunRecord, RunStore, StoreError};
pub use training::{load_model, retrain, retrain_and_swap, save_model, ModelFileError, TrainingError};
