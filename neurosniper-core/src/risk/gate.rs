//! Turns an aggregated decision into a sized, mode-gated one.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::session::{SessionCheck, SessionRules};
use crate::domain::{Decision, DecisionReason, DecisionStatus, Direction, Instrument, Position, TradingMode};
use crate::patterns::PatternTracker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    /// Fraction of equity that may be lost at the stop on one trade.
    pub max_risk_per_trade: f64,
    pub entry_threshold: f64,
    pub allow_pyramiding: bool,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            max_risk_per_trade: 0.01,
            entry_threshold: 0.6,
            allow_pyramiding: false,
        }
    }
}

/// Lane state the gate reads.
#[derive(Debug, Clone, Copy)]
pub struct RiskInput<'a> {
    pub instrument: &'a Instrument,
    pub equity: f64,
    pub open_positions: &'a [Position],
    /// Approved entries waiting for the next primary open.
    pub queued: &'a [Decision],
    pub patterns: &'a PatternTracker,
    pub trades_today: usize,
    pub vix: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RiskGate {
    params: RiskParams,
    session: SessionRules,
}

impl RiskGate {
    pub fn new(params: RiskParams, session: SessionRules) -> Self {
        Self { params, session }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    pub fn session(&self) -> &SessionRules {
        &self.session
    }

    /// Already-rejected decisions pass through untouched.
    pub fn evaluate(&self, mut decision: Decision, input: RiskInput<'_>) -> Decision {
        if decision.is_rejected() {
            return decision;
        }
        if let Err(reason) = self.check(&mut decision, &input) {
            debug!(
                instrument = %decision.instrument,
                id = %decision.id,
                %reason,
                "risk gate rejected decision"
            );
            decision.reject(reason);
            return decision;
        }
        decision.status = match decision.mode {
            TradingMode::Manual => DecisionStatus::Pending,
            TradingMode::Auto | TradingMode::DryRun => DecisionStatus::Approved,
        };
        decision
    }

    /// Re-run the state-dependent checks on a decision an operator accepted
    /// after it was sized. Its size and stop are not touched.
    pub fn recheck(&self, decision: &Decision, input: RiskInput<'_>) -> Result<(), DecisionReason> {
        if !decision.direction.is_directional() || decision.size <= 0.0 {
            return Err(DecisionReason::NoConsensus);
        }
        self.admissible(decision, &input)
    }

    /// Pyramiding against open and queued entries, trap cooldown, session.
    fn admissible(&self, decision: &Decision, input: &RiskInput<'_>) -> Result<(), DecisionReason> {
        let direction = decision.direction;
        if !self.params.allow_pyramiding {
            let open = input
                .open_positions
                .iter()
                .any(|p| p.is_open() && p.instrument == decision.instrument && p.direction == direction);
            let queued = input
                .queued
                .iter()
                .any(|q| q.instrument == decision.instrument && q.direction == direction);
            if open || queued {
                return Err(DecisionReason::Pyramiding);
            }
        }
        if input.patterns.cooldown_blocks(direction) {
            return Err(DecisionReason::TrapCooldown);
        }
        self.session
            .check(SessionCheck {
                at: decision.timestamp,
                trades_today: input.trades_today,
                vix: input.vix,
            })
            .map_err(DecisionReason::SessionBlocked)
    }

    fn check(&self, decision: &mut Decision, input: &RiskInput<'_>) -> Result<(), DecisionReason> {
        let direction = decision.direction;
        if !direction.is_directional() {
            return Err(DecisionReason::NoConsensus);
        }
        if decision.confidence < self.params.entry_threshold {
            return Err(DecisionReason::BelowEntryThreshold);
        }
        self.admissible(decision, input)?;

        let instrument = input.instrument;
        let entry = decision.reference_price;
        let stop = decision
            .stop_loss
            .map(|s| instrument.round_to_tick(s))
            .filter(|s| s.is_finite() && direction.sign() * (entry - s) > 0.0)
            .ok_or(DecisionReason::InvalidStop)?;
        let distance = (entry - stop).abs();

        let budget = self.params.max_risk_per_trade * input.equity;
        let size = instrument.floor_to_lots(budget / distance);
        if size <= 0.0 {
            return Err(DecisionReason::RiskBudgetTooSmall);
        }
        decision.stop_loss = Some(stop);
        decision.take_profit = decision
            .take_profit
            .map(|t| instrument.round_to_tick(t))
            .filter(|t| direction.sign() * (t - entry) > 0.0);
        decision.size = size;
        Ok(())
    }
}

/// Loss at the stop for a sized decision.
pub fn loss_at_stop(decision: &Decision) -> Option<f64> {
    decision
        .stop_loss
        .map(|stop| (decision.reference_price - stop).abs() * decision.size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DecisionId, ExitReason, PositionState, Timeframe};
    use crate::patterns::{Pattern, PatternKind};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 6)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn decision(direction: Direction, confidence: f64, stop: Option<f64>, mode: TradingMode) -> Decision {
        Decision {
            id: DecisionId::new("NIFTY", 1),
            instrument: "NIFTY".into(),
            timeframe: Timeframe::M15,
            timestamp: at(11, 0),
            direction,
            confidence,
            reference_price: 22_000.0,
            stop_loss: stop,
            take_profit: Some(22_000.0 + direction.sign() * 80.0),
            size: 0.0,
            mode,
            status: DecisionStatus::Pending,
            reason: None,
            contributing: Vec::new(),
            model_version: None,
            model_fallback: false,
        }
    }

    fn evaluate(gate: &RiskGate, d: Decision, positions: &[Position], patterns: &PatternTracker) -> Decision {
        let nifty = Instrument::preset("NIFTY");
        gate.evaluate(
            d,
            RiskInput {
                instrument: &nifty,
                equity: 1_000_000.0,
                open_positions: positions,
                queued: &[],
                patterns,
                trades_today: 0,
                vix: None,
            },
        )
    }

    #[test]
    fn sizes_to_whole_lots_within_budget() {
        let gate = RiskGate::default();
        let out = evaluate(
            &gate,
            decision(Direction::Long, 0.7, Some(21_960.0), TradingMode::Auto),
            &[],
            &PatternTracker::new(),
        );
        assert!(out.is_approved());
        // budget 10_000 / 40 = 250 units → 3 lots of 75
        assert_eq!(out.size, 225.0);
        assert!(loss_at_stop(&out).unwrap() <= 10_000.0);
    }

    #[test]
    fn mode_sets_status() {
        let gate = RiskGate::default();
        let tracker = PatternTracker::new();
        let manual = evaluate(&gate, decision(Direction::Short, 0.7, Some(22_040.0), TradingMode::Manual), &[], &tracker);
        assert!(manual.is_pending());
        assert!(manual.size > 0.0);
        let dry = evaluate(&gate, decision(Direction::Short, 0.7, Some(22_040.0), TradingMode::DryRun), &[], &tracker);
        assert!(dry.is_approved());
    }

    #[test]
    fn rejections_in_order() {
        let gate = RiskGate::default();
        let tracker = PatternTracker::new();
        let low = evaluate(&gate, decision(Direction::Long, 0.5, Some(21_960.0), TradingMode::Auto), &[], &tracker);
        assert_eq!(low.reason, Some(DecisionReason::BelowEntryThreshold));
        assert_eq!(low.size, 0.0);

        let wrong_side = evaluate(&gate, decision(Direction::Long, 0.7, Some(22_010.0), TradingMode::Auto), &[], &tracker);
        assert_eq!(wrong_side.reason, Some(DecisionReason::InvalidStop));
        let missing = evaluate(&gate, decision(Direction::Long, 0.7, None, TradingMode::Auto), &[], &tracker);
        assert_eq!(missing.reason, Some(DecisionReason::InvalidStop));

        let wide = evaluate(&gate, decision(Direction::Long, 0.7, Some(21_800.0), TradingMode::Auto), &[], &tracker);
        assert_eq!(wide.reason, Some(DecisionReason::RiskBudgetTooSmall));
    }

    #[test]
    fn blocks_pyramiding() {
        let open = Position {
            instrument: "NIFTY".into(),
            decision_id: DecisionId::new("NIFTY", 0),
            direction: Direction::Long,
            entry_time: at(10, 0),
            entry_price: 21_990.0,
            size: 75.0,
            stop_loss: 21_950.0,
            take_profit: None,
            state: PositionState::Open,
            exit_time: None,
            exit_price: None,
            exit_reason: None::<ExitReason>,
            realized_pnl: 0.0,
            costs: 0.0,
            bars_held: 3,
        };
        let gate = RiskGate::default();
        let tracker = PatternTracker::new();
        let out = evaluate(&gate, decision(Direction::Long, 0.7, Some(21_960.0), TradingMode::Auto), std::slice::from_ref(&open), &tracker);
        assert_eq!(out.reason, Some(DecisionReason::Pyramiding));

        let short = evaluate(&gate, decision(Direction::Short, 0.7, Some(22_040.0), TradingMode::Auto), &[open], &tracker);
        assert!(short.is_approved());
    }

    #[test]
    fn queued_entries_count_as_open_for_pyramiding() {
        let gate = RiskGate::default();
        let tracker = PatternTracker::new();
        let nifty = Instrument::preset("NIFTY");
        let queued = evaluate(&gate, decision(Direction::Long, 0.7, Some(21_960.0), TradingMode::Auto), &[], &tracker);
        let input = |trades_today| RiskInput {
            instrument: &nifty,
            equity: 1_000_000.0,
            open_positions: &[],
            queued: std::slice::from_ref(&queued),
            patterns: &tracker,
            trades_today,
            vix: None,
        };
        let out = gate.evaluate(decision(Direction::Long, 0.7, Some(21_960.0), TradingMode::Auto), input(1));
        assert_eq!(out.reason, Some(DecisionReason::Pyramiding));
        assert_eq!(gate.recheck(&queued, input(1)), Err(DecisionReason::Pyramiding));
    }

    #[test]
    fn recheck_applies_the_daily_cap() {
        let session = SessionRules {
            max_trades_per_day: 1,
            ..SessionRules::default()
        };
        let gate = RiskGate::new(RiskParams::default(), session);
        let tracker = PatternTracker::new();
        let nifty = Instrument::preset("NIFTY");
        let pending = evaluate(&gate, decision(Direction::Short, 0.7, Some(22_040.0), TradingMode::Manual), &[], &tracker);
        assert!(pending.is_pending());
        let input = |trades_today| RiskInput {
            instrument: &nifty,
            equity: 1_000_000.0,
            open_positions: &[],
            queued: &[],
            patterns: &tracker,
            trades_today,
            vix: None,
        };
        assert_eq!(gate.recheck(&pending, input(0)), Ok(()));
        assert!(matches!(
            gate.recheck(&pending, input(1)),
            Err(DecisionReason::SessionBlocked(ref why)) if why.contains("daily trade limit")
        ));
    }

    #[test]
    fn trap_cooldown_blocks_hunted_side() {
        let mut tracker = PatternTracker::new();
        tracker.extend([Pattern {
            kind: PatternKind::Trap {
                hunted_side: Direction::Long,
            },
            instrument: "NIFTY".into(),
            timeframe: Timeframe::M15,
            detected_at: at(10, 45),
            origin: at(10, 30),
            low: 21_990.0,
            high: 22_050.0,
            strength: 0.8,
            expires_after_bars: 6,
        }]);
        let gate = RiskGate::default();
        let long = evaluate(&gate, decision(Direction::Long, 0.9, Some(21_960.0), TradingMode::Auto), &[], &tracker);
        assert_eq!(long.reason, Some(DecisionReason::TrapCooldown));
        let short = evaluate(&gate, decision(Direction::Short, 0.9, Some(22_040.0), TradingMode::Auto), &[], &tracker);
        assert!(short.is_approved());
    }

    #[test]
    fn session_block_carries_reason() {
        let gate = RiskGate::default();
        let mut late = decision(Direction::Long, 0.7, Some(21_960.0), TradingMode::Auto);
        late.timestamp = at(15, 0);
        let out = evaluate(&gate, late, &[], &PatternTracker::new());
        assert!(matches!(out.reason, Some(DecisionReason::SessionBlocked(ref why)) if why.contains("entry cutoff")));
    }

    #[test]
    fn rejected_input_passes_through() {
        let mut d = decision(Direction::Flat, 0.0, None, TradingMode::Auto);
        d.reject(DecisionReason::ConflictingSignals);
        let out = evaluate(&RiskGate::default(), d, &[], &PatternTracker::new());
        assert_eq!(out.reason, Some(DecisionReason::ConflictingSignals));
    }
}
