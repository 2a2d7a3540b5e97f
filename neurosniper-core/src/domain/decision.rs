//! Decisions: the scored, risk-checked output of one aggregation cycle.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::direction::Direction;
use super::ids::{DecisionId, ModelVersion};
use super::signal::CandidateSignal;
use super::timeframe::Timeframe;

/// How approved decisions are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    /// Held as pending until explicitly accepted or rejected.
    Manual,
    /// Approved decisions go straight to execution.
    Auto,
    /// Approved decisions are recorded and never reach execution.
    #[default]
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Approved,
    Rejected,
}

/// Why a decision was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum DecisionReason {
    NoSignals,
    NoConsensus,
    ConflictingSignals,
    Unconfirmed,
    NotWarm,
    BelowEntryThreshold,
    Pyramiding,
    TrapCooldown,
    InvalidStop,
    RiskBudgetTooSmall,
    SessionBlocked(String),
    ManualRejected,
    /// Not acted on before the next primary cycle.
    Expired,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::NoSignals => write!(f, "no signals"),
            DecisionReason::NoConsensus => write!(f, "no directional consensus"),
            DecisionReason::ConflictingSignals => write!(f, "conflicting signals"),
            DecisionReason::Unconfirmed => write!(f, "unconfirmed"),
            DecisionReason::NotWarm => write!(f, "warming up"),
            DecisionReason::BelowEntryThreshold => write!(f, "below entry threshold"),
            DecisionReason::Pyramiding => write!(f, "position already open in this direction"),
            DecisionReason::TrapCooldown => write!(f, "trap cooldown active"),
            DecisionReason::InvalidStop => write!(f, "missing or invalid stop"),
            DecisionReason::RiskBudgetTooSmall => write!(f, "risk budget below one lot"),
            DecisionReason::SessionBlocked(why) => write!(f, "session blocked: {why}"),
            DecisionReason::ManualRejected => write!(f, "rejected by operator"),
            DecisionReason::Expired => write!(f, "expired before operator action"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub instrument: String,
    pub timeframe: Timeframe,
    /// Close time of the primary candle the decision was made on.
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    pub confidence: f64,
    pub reference_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub size: f64,
    pub mode: TradingMode,
    pub status: DecisionStatus,
    pub reason: Option<DecisionReason>,
    pub contributing: Vec<CandidateSignal>,
    pub model_version: Option<ModelVersion>,
    /// True when the model failed and confidence came from indicators alone.
    pub model_fallback: bool,
}

impl Decision {
    pub fn reject(&mut self, reason: DecisionReason) {
        self.status = DecisionStatus::Rejected;
        self.reason = Some(reason);
        self.size = 0.0;
    }

    pub fn is_rejected(&self) -> bool {
        self.status == DecisionStatus::Rejected
    }

    pub fn is_approved(&self) -> bool {
        self.status == DecisionStatus::Approved
    }

    pub fn is_pending(&self) -> bool {
        self.status == DecisionStatus::Pending
    }

    /// Canonical bytes used for determinism digests.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// BLAKE3 digest over a sequence of decisions in order.
pub fn decision_digest(decisions: &[Decision]) -> String {
    let mut hasher = blake3::Hasher::new();
    for decision in decisions {
        hasher.update(&decision.canonical_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_decision() -> Decision {
        Decision {
            id: DecisionId::new("NIFTY", 7),
            instrument: "NIFTY".into(),
            timeframe: Timeframe::M15,
            timestamp: NaiveDate::from_ymd_opt(2025, 5, 6)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap(),
            direction: Direction::Long,
            confidence: 0.72,
            reference_price: 22_100.0,
            stop_loss: Some(22_060.0),
            take_profit: Some(22_180.0),
            size: 150.0,
            mode: TradingMode::Auto,
            status: DecisionStatus::Approved,
            reason: None,
            contributing: Vec::new(),
            model_version: Some(ModelVersion(3)),
            model_fallback: false,
        }
    }

    #[test]
    fn reject_zeroes_size() {
        let mut d = sample_decision();
        d.reject(DecisionReason::TrapCooldown);
        assert!(d.is_rejected());
        assert_eq!(d.size, 0.0);
        assert_eq!(d.reason.as_ref().unwrap().to_string(), "trap cooldown active");
    }

    #[test]
    fn digest_depends_on_order_and_content() {
        let a = sample_decision();
        let mut b = sample_decision();
        b.id = DecisionId::new("NIFTY", 8);
        let ab = decision_digest(&[a.clone(), b.clone()]);
        assert_eq!(ab, decision_digest(&[a.clone(), b.clone()]));
        assert_ne!(ab, decision_digest(&[b, a.clone()]));
        let mut tweaked = a.clone();
        tweaked.confidence += 1e-12;
        assert_ne!(decision_digest(&[a]), decision_digest(&[tweaked]));
    }

    #[test]
    fn reason_serializes_with_code_tag() {
        let json = serde_json::to_string(&DecisionReason::SessionBlocked("after cutoff".into())).unwrap();
        assert_eq!(json, r#"{"code":"session_blocked","detail":"after cutoff"}"#);
        let json = serde_json::to_string(&DecisionReason::Unconfirmed).unwrap();
        assert_eq!(json, r#"{"code":"unconfirmed"}"#);
    }
}
