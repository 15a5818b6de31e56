// Narration lifecycle events, broadcast to any interested subscriber
use crate::error::NarrateError;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// How a narration request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationOutcome {
    /// Every unit was attempted; some may have failed along the way
    Completed { units: usize, failed_units: usize },
    /// Narration stopped early or never started
    Aborted(NarrateError),
}

impl NarrationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            NarrationOutcome::Completed { failed_units: 0, .. } => "completed",
            NarrationOutcome::Completed { .. } => "completed-with-errors",
            NarrationOutcome::Aborted(err) => err.kind(),
        }
    }

    pub fn failed_units(&self) -> usize {
        match self {
            NarrationOutcome::Completed { failed_units, .. } => *failed_units,
            NarrationOutcome::Aborted(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NarrationEvent {
    Started {
        session: u64,
        units: usize,
        chunked: bool,
        chars: usize,
    },
    UnitCompleted {
        session: u64,
        index: usize,
    },
    UnitFailed {
        session: u64,
        index: usize,
        kind: String,
        detail: String,
    },
    UnitTimedOut {
        session: u64,
        index: usize,
        deadline_ms: u64,
    },
    Finished {
        session: u64,
        outcome: String,
        failed_units: usize,
    },
    /// Request completed immediately without creating a session
    Rejected { reason: String },
    BreakerOpened { cooldown_ms: u64 },
    /// Cooldown ran out; requests are accepted again
    BreakerClosed,
    /// Operator closed the breaker through `reset`
    BreakerReset,
}

impl NarrationEvent {
    pub fn finished(session: u64, outcome: &NarrationOutcome) -> Self {
        NarrationEvent::Finished {
            session,
            outcome: outcome.label().to_string(),
            failed_units: outcome.failed_units(),
        }
    }
}

/// Thin wrapper over a broadcast channel; publishing never blocks and
/// never fails when nobody listens.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<NarrationEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: NarrationEvent) {
        trace!(target: "narrator", ?event, "publish");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
        self.tx.subscribe()
    }
}
