//! Combines one cycle's candidate signals into a single directional call.
//!
//! Steps, in order:
//! 1. drop signals under `min_confidence`;
//! 2. long and short primary signals both surviving → flat, conflicting;
//! 3. majority direction over primary signals (flat votes count against);
//! 4. cross-timeframe confirmation per [`ConfirmationRule`];
//! 5. confidence = weighted primary-signal confidence blended with the
//!    model's probability for the chosen direction, or penalised
//!    indicator-only confidence when the model failed.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{
    CandidateSignal, Decision, DecisionId, DecisionReason, DecisionStatus, Direction, ModelVersion,
    Timeframe, TradingMode,
};
use crate::features::FeatureSet;
use crate::indicators::names;
use crate::prediction::PredictionOutcome;

/// How cross-check timeframe evidence must agree with the primary majority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationRule {
    /// At least one cross-check signal agrees.
    #[default]
    AnyAgreement,
    /// More than half of the cross-check signals agree.
    Majority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub min_confidence: f64,
    pub confirmation: ConfirmationRule,
    pub signal_weight: f64,
    pub model_weight: f64,
    /// Multiplier applied to indicator-only confidence when the model failed.
    pub model_fallback_penalty: f64,
    /// Per-strategy weights; unlisted strategies weigh 1.0.
    pub strategy_weights: BTreeMap<String, f64>,
    /// EMA pair for the cross-check fallback when no cross-check signal exists.
    pub fast_ema: String,
    pub slow_ema: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.55,
            confirmation: ConfirmationRule::AnyAgreement,
            signal_weight: 0.6,
            model_weight: 0.4,
            model_fallback_penalty: 0.8,
            strategy_weights: BTreeMap::new(),
            fast_ema: names::EMA_FAST.to_string(),
            slow_ema: names::EMA_SLOW.to_string(),
        }
    }
}

/// Latest state of the cross-check timeframe as seen by a primary cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossCheckView {
    pub features: Option<FeatureSet>,
    pub signals: Vec<CandidateSignal>,
}

#[derive(Debug, Clone, Copy)]
pub struct AggregationInput<'a> {
    pub primary: &'a [CandidateSignal],
    pub cross_check: &'a CrossCheckView,
    pub prediction: &'a PredictionOutcome,
}

/// Aggregator output before the risk gate.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub direction: Direction,
    pub confidence: f64,
    pub contributing: Vec<CandidateSignal>,
    pub rejection: Option<DecisionReason>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub model_version: Option<ModelVersion>,
    pub model_fallback: bool,
}

impl Aggregate {
    pub fn into_decision(
        self,
        id: DecisionId,
        instrument: &str,
        timeframe: Timeframe,
        timestamp: NaiveDateTime,
        reference_price: f64,
        mode: TradingMode,
    ) -> Decision {
        let status = if self.rejection.is_some() {
            DecisionStatus::Rejected
        } else {
            DecisionStatus::Pending
        };
        Decision {
            id,
            instrument: instrument.to_string(),
            timeframe,
            timestamp,
            direction: self.direction,
            confidence: self.confidence,
            reference_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            size: 0.0,
            mode,
            status,
            reason: self.rejection,
            contributing: self.contributing,
            model_version: self.model_version,
            model_fallback: self.model_fallback,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn aggregate(&self, input: AggregationInput<'_>) -> Aggregate {
        let floor = self.config.min_confidence;
        let mut primary: Vec<CandidateSignal> = input
            .primary
            .iter()
            .filter(|s| s.confidence >= floor)
            .cloned()
            .collect();
        primary.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let cross: Vec<&CandidateSignal> = input
            .cross_check
            .signals
            .iter()
            .filter(|s| s.confidence >= floor)
            .collect();

        let (model_version, model_fallback) = match input.prediction {
            PredictionOutcome::Available(p) => (Some(p.model_version), false),
            PredictionOutcome::Failed(_) => (None, true),
        };
        let flat = |reason: DecisionReason, contributing: Vec<CandidateSignal>| Aggregate {
            direction: Direction::Flat,
            confidence: 0.0,
            contributing,
            rejection: Some(reason),
            stop_loss: None,
            take_profit: None,
            model_version,
            model_fallback,
        };

        if primary.is_empty() {
            return flat(DecisionReason::NoSignals, Vec::new());
        }

        let longs = primary.iter().filter(|s| s.direction == Direction::Long).count();
        let shorts = primary.iter().filter(|s| s.direction == Direction::Short).count();
        let flats = primary.len() - longs - shorts;
        if longs > 0 && shorts > 0 {
            return flat(DecisionReason::ConflictingSignals, primary);
        }
        let (direction, votes) = if longs > 0 {
            (Direction::Long, longs)
        } else {
            (Direction::Short, shorts)
        };
        if votes <= flats {
            return flat(DecisionReason::NoConsensus, primary);
        }

        let mut contributing: Vec<CandidateSignal> = primary
            .iter()
            .filter(|s| s.direction == direction)
            .cloned()
            .collect();
        let confidence = self.confidence(&contributing, direction, input.prediction);
        let agreeing: Vec<CandidateSignal> = cross
            .iter()
            .filter(|s| s.direction == direction)
            .map(|s| (*s).clone())
            .collect();
        let confirmed = self.is_confirmed(direction, agreeing.len(), cross.len(), input.cross_check);
        contributing.extend(agreeing);
        contributing.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let (stop_loss, take_profit) = levels(&contributing, direction);
        Aggregate {
            direction,
            confidence,
            contributing,
            rejection: (!confirmed).then_some(DecisionReason::Unconfirmed),
            stop_loss,
            take_profit,
            model_version,
            model_fallback,
        }
    }

    fn is_confirmed(
        &self,
        direction: Direction,
        agreeing: usize,
        total: usize,
        view: &CrossCheckView,
    ) -> bool {
        if total == 0 {
            return self.indicator_bias(view.features.as_ref()) == Some(direction);
        }
        match self.config.confirmation {
            ConfirmationRule::AnyAgreement => agreeing > 0,
            ConfirmationRule::Majority => agreeing * 2 > total,
        }
    }

    /// Direction of the fast/slow EMA pair on the cross-check timeframe.
    fn indicator_bias(&self, features: Option<&FeatureSet>) -> Option<Direction> {
        let fs = features?;
        let fast = fs.get(&self.config.fast_ema)?;
        let slow = fs.get(&self.config.slow_ema)?;
        if fast > slow {
            Some(Direction::Long)
        } else if fast < slow {
            Some(Direction::Short)
        } else {
            None
        }
    }

    fn confidence(
        &self,
        contributing: &[CandidateSignal],
        direction: Direction,
        prediction: &PredictionOutcome,
    ) -> f64 {
        let (weighted, total) = contributing.iter().fold((0.0, 0.0), |(acc, tot), s| {
            let w = self
                .config
                .strategy_weights
                .get(&s.strategy)
                .copied()
                .unwrap_or(1.0)
                .max(0.0);
            (acc + w * s.confidence, tot + w)
        });
        let signal_conf = if total > 0.0 { weighted / total } else { 0.0 };

        let blended = match prediction {
            PredictionOutcome::Available(p) => {
                let sw = self.config.signal_weight.max(0.0);
                let mw = self.config.model_weight.max(0.0);
                if sw + mw > 0.0 {
                    (sw * signal_conf + mw * p.probability(direction)) / (sw + mw)
                } else {
                    signal_conf
                }
            }
            PredictionOutcome::Failed(_) => signal_conf * self.config.model_fallback_penalty,
        };
        blended.clamp(0.0, 1.0)
    }
}

/// Most conservative stop (farthest from entry) and nearest target.
fn levels(signals: &[CandidateSignal], direction: Direction) -> (Option<f64>, Option<f64>) {
    let stops = signals.iter().filter_map(|s| s.stop);
    let targets = signals.iter().filter_map(|s| s.target);
    match direction {
        Direction::Long => (
            stops.min_by(f64::total_cmp),
            targets.min_by(f64::total_cmp),
        ),
        Direction::Short => (
            stops.max_by(f64::total_cmp),
            targets.max_by(f64::total_cmp),
        ),
        Direction::Flat => (None, None),
    }
}
