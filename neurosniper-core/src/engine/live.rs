//! Live engine: one worker thread per instrument lane.
//!
//! Each lane owns its state and processes its events strictly in order;
//! lanes run concurrently. Cross-instrument reads go through an immutable
//! [`MarketSnapshot`] taken from the [`SnapshotBoard`] at cycle start, and
//! the model handle is taken once per cycle from the shared [`ModelSource`].

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::NaiveDateTime;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::dispatch::DecisionRouter;
use super::lane::InstrumentLane;
use super::pipeline::Pipeline;
use super::source::{CandleSource, FeedEvent, OpenInterestSource, SourceError};
use crate::domain::{
    Decision, DecisionId, DecisionReason, Instrument, InstrumentView, MarketSnapshot,
};
use crate::prediction::ModelSource;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no lane for instrument {0}")]
    UnknownInstrument(String),

    #[error("lane {0} has shut down")]
    LaneClosed(String),

    #[error("failed to spawn lane thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum AckError {
    #[error("no pending decision {0}")]
    UnknownDecision(DecisionId),

    #[error("lane {0} has shut down")]
    LaneClosed(String),
}

/// Copy-on-write holder of the latest cross-instrument snapshot.
#[derive(Debug, Default)]
pub struct SnapshotBoard {
    current: RwLock<Arc<MarketSnapshot>>,
}

impl SnapshotBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<MarketSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn publish(&self, view: InstrumentView) {
        let mut current = self.current.write();
        let next = current.with_view(view);
        *current = Arc::new(next);
    }
}

enum LaneCommand {
    Event(FeedEvent),
    Accept(Decision, Sender<Decision>),
    SetVix(Option<f64>),
    Disable(String),
    Enable(String),
    Flush(Sender<()>),
    Shutdown,
}

struct LaneHandle {
    tx: Sender<LaneCommand>,
    join: Option<JoinHandle<()>>,
}

/// Shared by the engine and every lane thread.
struct Shared {
    board: SnapshotBoard,
    models: Arc<dyn ModelSource>,
    router: DecisionRouter,
    pending: Mutex<BTreeMap<DecisionId, Decision>>,
}

pub struct LiveEngine {
    lanes: BTreeMap<String, LaneHandle>,
    shared: Arc<Shared>,
    pipeline: Arc<Pipeline>,
}

impl LiveEngine {
    /// Spawn one lane per instrument, each starting from `equity`.
    pub fn start(
        pipeline: Arc<Pipeline>,
        instruments: &[Instrument],
        equity: f64,
        models: Arc<dyn ModelSource>,
        router: DecisionRouter,
    ) -> Result<Self, EngineError> {
        let shared = Arc::new(Shared {
            board: SnapshotBoard::new(),
            models,
            router,
            pending: Mutex::new(BTreeMap::new()),
        });
        let mut lanes = BTreeMap::new();
        for instrument in instruments {
            let (tx, rx) = mpsc::channel();
            let lane = InstrumentLane::new(Arc::clone(&pipeline), instrument.clone(), equity);
            let shared = Arc::clone(&shared);
            let join = thread::Builder::new()
                .name(format!("lane-{}", instrument.symbol.to_ascii_lowercase()))
                .spawn(move || lane_loop(lane, rx, shared))?;
            lanes.insert(
                instrument.symbol.clone(),
                LaneHandle {
                    tx,
                    join: Some(join),
                },
            );
        }
        info!(lanes = lanes.len(), "live engine started");
        Ok(Self {
            lanes,
            shared,
            pipeline,
        })
    }

    pub fn instruments(&self) -> Vec<&str> {
        self.lanes.keys().map(String::as_str).collect()
    }

    pub fn snapshot(&self) -> Arc<MarketSnapshot> {
        self.shared.board.snapshot()
    }

    /// Hand one event to its instrument's lane.
    pub fn submit(&self, event: FeedEvent) -> Result<(), EngineError> {
        let instrument = event.instrument().to_ascii_uppercase();
        self.send(&instrument, LaneCommand::Event(event))
    }

    /// Pull one round from the sources: OI first, then cross-check and
    /// primary candles. Timeouts are skipped. Returns events submitted.
    pub fn poll(
        &self,
        candles: &mut dyn CandleSource,
        oi: &mut dyn OpenInterestSource,
    ) -> Result<usize, EngineError> {
        let config = self.pipeline.config();
        let mut submitted = 0;
        for instrument in self.lanes.keys() {
            match oi.latest(instrument) {
                Ok(Some(snapshot)) => {
                    self.send(instrument, LaneCommand::Event(FeedEvent::OpenInterest(snapshot)))?;
                    submitted += 1;
                }
                Ok(None) | Err(SourceError::Timeout) => {}
                Err(e) => warn!(instrument = %instrument, error = %e, "oi source failed"),
            }
            for timeframe in [config.cross_check, config.primary] {
                match candles.next(instrument, timeframe) {
                    Ok(event) => {
                        if let Some(event) = FeedEvent::from_candle_event(event) {
                            self.send(instrument, LaneCommand::Event(event))?;
                            submitted += 1;
                        }
                    }
                    Err(SourceError::Timeout) => {}
                    Err(e) => warn!(instrument = %instrument, %timeframe, error = %e, "candle source failed"),
                }
            }
        }
        Ok(submitted)
    }

    /// Block until every lane has processed what was submitted before.
    pub fn flush(&self) -> Result<(), EngineError> {
        for (instrument, lane) in &self.lanes {
            let (ack_tx, ack_rx) = mpsc::channel();
            lane.tx
                .send(LaneCommand::Flush(ack_tx))
                .map_err(|_| EngineError::LaneClosed(instrument.clone()))?;
            ack_rx
                .recv()
                .map_err(|_| EngineError::LaneClosed(instrument.clone()))?;
        }
        Ok(())
    }

    pub fn pending(&self) -> Vec<Decision> {
        self.shared.pending.lock().values().cloned().collect()
    }

    /// Accept a pending manual decision.
    ///
    /// The lane re-checks it against its current positions and session
    /// before queueing it for the next primary open. Blocks until the lane
    /// has answered. The returned decision is `Approved` and forwarded to
    /// execution, or `Rejected` with the reason the lane refused it.
    pub fn accept(&self, id: &DecisionId) -> Result<Decision, AckError> {
        let decision = self.take_pending(id)?;
        let instrument = decision.instrument.clone();
        let lane = self
            .lanes
            .get(&instrument)
            .ok_or_else(|| AckError::LaneClosed(instrument.clone()))?;
        let (reply_tx, reply_rx) = mpsc::channel();
        lane.tx
            .send(LaneCommand::Accept(decision, reply_tx))
            .map_err(|_| AckError::LaneClosed(instrument.clone()))?;
        reply_rx.recv().map_err(|_| AckError::LaneClosed(instrument))
    }

    pub fn reject(&self, id: &DecisionId) -> Result<Decision, AckError> {
        let mut decision = self.take_pending(id)?;
        decision.reject(DecisionReason::ManualRejected);
        self.shared.router.route(&decision);
        Ok(decision)
    }

    pub fn set_vix(&self, instrument: &str, vix: Option<f64>) -> Result<(), EngineError> {
        self.send(&instrument.to_ascii_uppercase(), LaneCommand::SetVix(vix))
    }

    pub fn disable_strategy(&self, instrument: &str, strategy: &str) -> Result<(), EngineError> {
        self.send(&instrument.to_ascii_uppercase(), LaneCommand::Disable(strategy.to_string()))
    }

    pub fn enable_strategy(&self, instrument: &str, strategy: &str) -> Result<(), EngineError> {
        self.send(&instrument.to_ascii_uppercase(), LaneCommand::Enable(strategy.to_string()))
    }

    /// Stop every lane after it drains its queue.
    pub fn shutdown(mut self) {
        self.stop_lanes();
    }

    fn take_pending(&self, id: &DecisionId) -> Result<Decision, AckError> {
        self.shared
            .pending
            .lock()
            .remove(id)
            .ok_or_else(|| AckError::UnknownDecision(id.clone()))
    }

    fn send(&self, instrument: &str, command: LaneCommand) -> Result<(), EngineError> {
        let lane = self
            .lanes
            .get(instrument)
            .ok_or_else(|| EngineError::UnknownInstrument(instrument.to_string()))?;
        lane.tx
            .send(command)
            .map_err(|_| EngineError::LaneClosed(instrument.to_string()))
    }

    fn stop_lanes(&mut self) {
        for lane in self.lanes.values() {
            let _ = lane.tx.send(LaneCommand::Shutdown);
        }
        for (instrument, lane) in &mut self.lanes {
            if let Some(join) = lane.join.take() {
                if join.join().is_err() {
                    warn!(instrument = %instrument, "lane thread panicked");
                }
            }
        }
    }
}

impl Drop for LiveEngine {
    fn drop(&mut self) {
        self.stop_lanes();
    }
}

fn lane_loop(mut lane: InstrumentLane, rx: Receiver<LaneCommand>, shared: Arc<Shared>) {
    loop {
        match rx.recv() {
            Ok(LaneCommand::Shutdown) | Err(_) => break,
            Ok(LaneCommand::Event(event)) => handle_event(&mut lane, event, &shared),
            Ok(LaneCommand::Accept(decision, reply)) => {
                let decision = lane.accept(decision);
                shared.router.route_accepted(&decision);
                let _ = reply.send(decision);
            }
            Ok(LaneCommand::SetVix(vix)) => lane.set_vix(vix),
            Ok(LaneCommand::Disable(name)) => lane.disable_strategy(&name),
            Ok(LaneCommand::Enable(name)) => lane.enable_strategy(&name),
            Ok(LaneCommand::Flush(ack)) => {
                let _ = ack.send(());
            }
        }
    }
    debug!(instrument = %lane.symbol(), "lane stopped");
}

fn handle_event(lane: &mut InstrumentLane, event: FeedEvent, shared: &Shared) {
    match event {
        FeedEvent::Candle(candle) => {
            // one model handle and one market snapshot per cycle
            let model = shared.models.active_version();
            let market = shared.board.snapshot();
            let out = lane.on_candle(candle, model.as_ref(), &market);
            if let Some(cycle) = lane.last_cycle() {
                expire_pending(shared, lane.symbol(), cycle);
            }
            if let Some(view) = out.view {
                shared.board.publish(view);
            }
            if let Some(decision) = out.decision {
                if decision.is_pending() {
                    shared.pending.lock().insert(decision.id.clone(), decision.clone());
                }
                shared.router.route(&decision);
            }
        }
        FeedEvent::Gap {
            timeframe, from, to, ..
        } => {
            lane.on_gap(timeframe, from, to);
        }
        FeedEvent::OpenInterest(snapshot) => {
            lane.on_open_interest(snapshot);
        }
    }
}

/// Reject pending decisions from before the lane's latest primary cycle.
fn expire_pending(shared: &Shared, instrument: &str, cycle: NaiveDateTime) {
    let expired: Vec<Decision> = {
        let mut pending = shared.pending.lock();
        let ids: Vec<DecisionId> = pending
            .values()
            .filter(|d| d.instrument == instrument && d.timestamp < cycle)
            .map(|d| d.id.clone())
            .collect();
        ids.iter().filter_map(|id| pending.remove(id)).collect()
    };
    for mut decision in expired {
        decision.reject(DecisionReason::Expired);
        debug!(instrument, id = %decision.id, "pending decision expired");
        shared.router.route(&decision);
    }
}
