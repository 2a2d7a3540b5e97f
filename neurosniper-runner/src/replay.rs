//! Replay engine: walks a historical feed through one instrument lane.
//!
//! The lane is the same one the live engine runs, so a replay exercises the
//! full pipeline. The model handle is taken once up front; every cycle of a
//! run sees the same version.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use neurosniper_core::domain::{Decision, Instrument, MarketSnapshot, Position, Timeframe};
use neurosniper_core::engine::{DecisionRouter, FeedEvent, InstrumentLane, LaneOutput, Pipeline};
use neurosniper_core::error::Fault;
use neurosniper_core::prediction::ModelHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPhase {
    /// Built, no event seen yet.
    Loading,
    /// Feature engines filling their windows.
    Warmup,
    Replaying,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Everything a finished replay produced.
#[derive(Debug, Clone, Default)]
pub struct ReplayOutcome {
    pub decisions: Vec<Decision>,
    /// Closed positions in entry order.
    pub positions: Vec<Position>,
    pub equity_curve: Vec<EquityPoint>,
    pub faults: Vec<Fault>,
    pub events: usize,
    pub warmup_events: usize,
}

pub struct Replay {
    lane: InstrumentLane,
    primary: Timeframe,
    model: ModelHandle,
    router: DecisionRouter,
    market: MarketSnapshot,
    phase: ReplayPhase,
    outcome: ReplayOutcome,
    last_close: Option<(NaiveDateTime, f64)>,
}

impl Replay {
    pub fn new(pipeline: Arc<Pipeline>, instrument: Instrument, capital: f64, model: ModelHandle) -> Self {
        let primary = pipeline.config().primary;
        Self {
            lane: InstrumentLane::new(pipeline, instrument, capital),
            primary,
            model,
            router: DecisionRouter::new(),
            market: MarketSnapshot::empty(),
            phase: ReplayPhase::Loading,
            outcome: ReplayOutcome::default(),
            last_close: None,
        }
    }

    /// Observers and sinks that should see replayed decisions.
    pub fn with_router(mut self, router: DecisionRouter) -> Self {
        self.router = router;
        self
    }

    pub fn phase(&self) -> ReplayPhase {
        self.phase
    }

    pub fn lane(&self) -> &InstrumentLane {
        &self.lane
    }

    /// Apply one event in feed order.
    pub fn step(&mut self, event: FeedEvent) {
        match self.phase {
            ReplayPhase::Complete => {
                warn!(instrument = %self.lane.symbol(), "event after replay completed, ignored");
                return;
            }
            ReplayPhase::Loading => {
                self.phase = ReplayPhase::Warmup;
                debug!(instrument = %self.lane.symbol(), "replay warming up");
            }
            _ => {}
        }
        self.outcome.events += 1;
        if self.phase == ReplayPhase::Warmup {
            self.outcome.warmup_events += 1;
        }

        match event {
            FeedEvent::OpenInterest(snapshot) => {
                if let Some(fault) = self.lane.on_open_interest(snapshot) {
                    self.outcome.faults.push(fault);
                }
            }
            FeedEvent::Gap { timeframe, from, to, .. } => {
                let fault = self.lane.on_gap(timeframe, from, to);
                self.outcome.faults.push(fault);
            }
            FeedEvent::Candle(candle) => {
                let primary = candle.timeframe == self.primary;
                let close_at = (candle.close_time(), candle.close);
                let out = self.lane.on_candle(candle, self.model.as_ref(), &self.market);
                self.absorb(out);
                if primary {
                    self.last_close = Some(close_at);
                    self.mark(close_at.0, close_at.1);
                }
            }
        }

        if self.phase == ReplayPhase::Warmup && self.lane.is_warm() {
            self.phase = ReplayPhase::Replaying;
            info!(
                instrument = %self.lane.symbol(),
                warmup_events = self.outcome.warmup_events,
                "replay warm"
            );
        }
    }

    fn absorb(&mut self, out: LaneOutput) {
        if let Some(view) = out.view {
            self.market = self.market.with_view(view);
        }
        self.outcome.faults.extend(out.faults);
        self.outcome.positions.extend(out.closed);
        if let Some(decision) = out.decision {
            self.router.route(&decision);
            self.outcome.decisions.push(decision);
        }
    }

    fn mark(&mut self, at: NaiveDateTime, close: f64) {
        let equity = self.lane.equity() + self.lane.positions().unrealized_pnl(close);
        self.outcome.equity_curve.push(EquityPoint { timestamp: at, equity });
    }

    /// Close whatever is still open at the last primary close and finalize.
    pub fn finish(mut self) -> ReplayOutcome {
        if let Some((at, close)) = self.last_close {
            let closed = self.lane.finish(at, close);
            if !closed.is_empty() {
                self.outcome.positions.extend(closed);
                self.outcome.equity_curve.push(EquityPoint {
                    timestamp: at,
                    equity: self.lane.equity(),
                });
            }
        }
        self.outcome
            .positions
            .sort_by(|a, b| (a.entry_time, &a.decision_id).cmp(&(b.entry_time, &b.decision_id)));
        self.phase = ReplayPhase::Complete;
        info!(
            instrument = %self.lane.symbol(),
            events = self.outcome.events,
            decisions = self.outcome.decisions.len(),
            positions = self.outcome.positions.len(),
            faults = self.outcome.faults.len(),
            "replay complete"
        );
        self.outcome
    }

    pub fn run(mut self, events: impl IntoIterator<Item = FeedEvent>) -> ReplayOutcome {
        for event in events {
            self.step(event);
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::generate_synthetic;
    use crate::feed::HistoricalFeed;
    use chrono::NaiveDate;
    use neurosniper_core::domain::DecisionStatus;
    use neurosniper_core::engine::{DecisionLog, PipelineConfig};
    use neurosniper_core::prediction::LogisticModel;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn replay() -> Replay {
        let pipeline = Arc::new(Pipeline::new(PipelineConfig::default()).unwrap());
        Replay::new(
            pipeline,
            Instrument::preset("NIFTY"),
            1_000_000.0,
            Arc::new(LogisticModel::baseline()),
        )
    }

    #[test]
    fn phases_advance_in_order() {
        let data = generate_synthetic("NIFTY", "replay", date(5), date(9), Timeframe::M5);
        let feed = HistoricalFeed::new(&data, Timeframe::M15, Timeframe::M5);
        let mut r = replay();
        assert_eq!(r.phase(), ReplayPhase::Loading);

        let mut seen = vec![r.phase()];
        for event in feed.into_events() {
            r.step(event);
            if seen.last() != Some(&r.phase()) {
                seen.push(r.phase());
            }
        }
        assert_eq!(seen, vec![ReplayPhase::Loading, ReplayPhase::Warmup, ReplayPhase::Replaying]);
        let outcome = r.finish();
        assert!(outcome.warmup_events > 0);
        assert!(outcome.warmup_events < outcome.events);
        // one equity mark per primary candle
        assert!(outcome.equity_curve.len() >= 5 * 25);
        assert!(!outcome.decisions.is_empty());
    }

    #[test]
    fn no_positions_left_open() {
        let data = generate_synthetic("NIFTY", "replay", date(5), date(16), Timeframe::M5);
        let feed = HistoricalFeed::new(&data, Timeframe::M15, Timeframe::M5);
        let outcome = replay().run(feed.into_events());
        assert!(outcome.positions.iter().all(|p| !p.is_open()));
        assert!(outcome
            .positions
            .windows(2)
            .all(|w| w[0].entry_time <= w[1].entry_time));
    }

    #[test]
    fn observers_see_every_decision() {
        let data = generate_synthetic("NIFTY", "replay", date(5), date(7), Timeframe::M5);
        let feed = HistoricalFeed::new(&data, Timeframe::M15, Timeframe::M5);
        let log = Arc::new(DecisionLog::new());
        let outcome = replay()
            .with_router(DecisionRouter::new().with_observer(log.clone()))
            .run(feed.into_events());
        assert_eq!(log.decisions(), outcome.decisions);
        // dry run: nothing is left pending
        assert!(outcome.decisions.iter().all(|d| d.status != DecisionStatus::Pending));
    }

    #[test]
    fn events_after_completion_are_ignored() {
        let data = generate_synthetic("NIFTY", "replay", date(5), date(5), Timeframe::M5);
        let feed = HistoricalFeed::new(&data, Timeframe::M15, Timeframe::M5);
        let mut r = replay();
        r.phase = ReplayPhase::Complete;
        for event in feed.into_events() {
            r.step(event);
        }
        assert_eq!(r.outcome.events, 0);
    }
}
