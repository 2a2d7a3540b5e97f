//! Signal Aggregator: candidate signals + model view → one decision.

pub mod aggregator;

pub use aggregator::{Aggregate, AggregationInput, Aggregator, AggregatorConfig, ConfirmationRule, CrossCheckView};
