//! Routing of finished decisions to observers and the execution sink.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::source::{DecisionObserver, ExecutionSink};
use crate::domain::{Decision, TradingMode};

/// Where a routed decision ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Observers only.
    Observed,
    /// Observers and the execution sink.
    Executed,
    /// Observers only, waiting for an operator.
    Held,
}

#[derive(Default, Clone)]
pub struct DecisionRouter {
    observers: Vec<Arc<dyn DecisionObserver>>,
    sink: Option<Arc<dyn ExecutionSink>>,
}

impl DecisionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Notify observers; forward auto-approved decisions to execution.
    pub fn route(&self, decision: &Decision) -> Routing {
        self.notify(decision);
        if decision.is_pending() {
            return Routing::Held;
        }
        if decision.is_approved() && decision.mode == TradingMode::Auto {
            self.execute(decision)
        } else {
            Routing::Observed
        }
    }

    /// Forward an operator-accepted decision. Dry-run decisions never reach
    /// the sink, whatever their status.
    pub fn route_accepted(&self, decision: &Decision) -> Routing {
        self.notify(decision);
        if decision.is_approved() && decision.mode == TradingMode::Manual {
            self.execute(decision)
        } else {
            Routing::Observed
        }
    }

    fn notify(&self, decision: &Decision) {
        for observer in &self.observers {
            observer.on_decision(decision);
        }
    }

    fn execute(&self, decision: &Decision) -> Routing {
        match &self.sink {
            Some(sink) => {
                sink.execute(decision);
                Routing::Executed
            }
            None => {
                warn!(id = %decision.id, "approved decision with no execution sink attached");
                Routing::Observed
            }
        }
    }
}

/// In-memory record of every decision it sees, usable as observer or sink.
#[derive(Debug, Default)]
pub struct DecisionLog {
    entries: Mutex<Vec<Decision>>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(&self) -> Vec<Decision> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DecisionObserver for DecisionLog {
    fn on_decision(&self, decision: &Decision) {
        self.entries.lock().push(decision.clone());
    }
}

impl ExecutionSink for DecisionLog {
    fn execute(&self, decision: &Decision) {
        self.entries.lock().push(decision.clone());
    }
}
