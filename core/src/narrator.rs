//! Playback orchestration.
//!
//! [`Narrator`] owns at most one playback session at a time. A session is a
//! Tokio task that speaks its units strictly in order, each guarded by a
//! [`Watchdog`]. Whatever happens (success, backend error, timeout,
//! cancellation, supersession) the request's completion callback runs
//! exactly once: whoever removes the session from the slot owns the
//! callback, and the slot is only ever emptied under its lock.
//!
//! Callbacks are always invoked after every lock is released, so a
//! completion callback may call straight back into the narrator.

use crate::animator::{AnimationBinding, Animator};
use crate::backend::SynthesisBackend;
use crate::breaker::{FailureKind, FailureTracker};
use crate::chunker;
use crate::config::NarratorConfig;
use crate::error::{NarrateError, SynthesisError};
use crate::events::{EventPublisher, NarrationEvent, NarrationOutcome};
use crate::telemetry::{Counter, NarrationStats, StatsCollector};
use crate::watchdog::{self, Watchdog};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

type DoneCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Speaking,
}

struct ActiveSession {
    id: u64,
    task: JoinHandle<()>,
    on_done: DoneCallback,
}

enum UnitError {
    Backend(SynthesisError),
    Timeout(Duration),
}

struct Shared {
    backend: Arc<dyn SynthesisBackend>,
    animation: AnimationBinding,
    breaker: Mutex<FailureTracker>,
    session: Mutex<Option<ActiveSession>>,
    next_session: AtomicU64,
    events: EventPublisher,
    stats: StatsCollector,
    config: NarratorConfig,
}

/// Narrates text through a [`SynthesisBackend`] while bracketing it with an
/// [`Animator`].
///
/// Cheap to clone; clones share the same session and breaker. Methods that
/// start playback must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct Narrator {
    shared: Arc<Shared>,
}

impl Narrator {
    pub fn new(
        backend: Arc<dyn SynthesisBackend>,
        animator: Arc<dyn Animator>,
        config: NarratorConfig,
    ) -> Self {
        info!(
            target: "narrator",
            backend = backend.name(),
            supported = backend.is_supported(),
            "Narrator ready"
        );
        let shared = Shared {
            breaker: Mutex::new(FailureTracker::new(
                config.failure_threshold,
                config.cooldown,
            )),
            events: EventPublisher::new(config.event_capacity),
            animation: AnimationBinding::new(animator),
            session: Mutex::new(None),
            next_session: AtomicU64::new(0),
            stats: StatsCollector::default(),
            backend,
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Speak `text`, calling `on_done` exactly once when the request is over.
    ///
    /// Empty text, an unsupported backend or an open circuit breaker call
    /// `on_done` before returning. A narration already in progress is
    /// cancelled first and its own callback fires before this returns.
    pub fn speak<F>(&self, text: &str, on_done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let on_done: DoneCallback = Box::new(on_done);
        if let Err(err) = self.shared.admit(text) {
            self.shared.reject(&err);
            on_done();
            return;
        }

        let shared = &self.shared;
        let id = shared.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let superseded = {
            let mut slot = shared.session.lock();
            let previous = slot
                .take()
                .map(|old| shared.cancel_session(old, NarrateError::Superseded));
            shared.animation.bind(id, text);
            let task = tokio::spawn(run_session(
                Arc::clone(shared),
                id,
                text.to_string(),
                previous.is_some(),
            ));
            *slot = Some(ActiveSession { id, task, on_done });
            previous
        };

        if let Some(done) = superseded {
            done();
        }
    }

    /// Speak `text` and wait until the request is over.
    pub async fn narrate(&self, text: &str) {
        let (tx, rx) = oneshot::channel();
        self.speak(text, move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }

    /// Cancel the current narration, if any. Its completion callback fires;
    /// the failure count is left untouched.
    pub fn stop(&self) {
        let cancelled = {
            let mut slot = self.shared.session.lock();
            slot.take()
                .map(|s| self.shared.cancel_session(s, NarrateError::Cancelled))
        };
        match cancelled {
            Some(done) => done(),
            None => self.shared.silence(),
        }
    }

    /// Operator escape hatch: close the breaker, cancel any narration and
    /// silence backend and animator.
    pub fn reset(&self) {
        self.shared.breaker.lock().reset();
        let cancelled = {
            let mut slot = self.shared.session.lock();
            slot.take()
                .map(|s| self.shared.cancel_session(s, NarrateError::Cancelled))
        };
        self.shared.silence();
        self.shared.events.publish(NarrationEvent::BreakerReset);
        info!(target: "narrator", "Speech synthesis manually reset");

        if let Some(done) = cancelled {
            done();
        }
    }

    /// Whether the circuit breaker currently turns requests into no-ops.
    pub fn is_disabled(&self) -> bool {
        self.shared.lock_breaker().is_open()
    }

    pub fn is_animating(&self) -> bool {
        self.shared.animation.is_animating()
    }

    pub fn current_openness(&self) -> f32 {
        self.shared.animation.current_openness()
    }

    pub fn state(&self) -> PlaybackState {
        if self.shared.session.lock().is_some() {
            PlaybackState::Speaking
        } else {
            PlaybackState::Idle
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.shared.lock_breaker().consecutive_failures()
    }

    pub fn remaining_cooldown(&self) -> Option<Duration> {
        self.shared.lock_breaker().remaining_cooldown()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
        self.shared.events.subscribe()
    }

    pub fn stats(&self) -> NarrationStats {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &NarratorConfig {
        &self.shared.config
    }
}

async fn run_session(shared: Arc<Shared>, id: u64, text: String, superseded_previous: bool) {
    let chars = text.chars().count();
    let chunked = chars > shared.config.chunk_threshold_chars;
    let units = if chunked {
        chunker::split(&text)
    } else {
        vec![text]
    };

    shared.stats.incr(Counter::SessionStarted);
    shared.events.publish(NarrationEvent::Started {
        session: id,
        units: units.len(),
        chunked,
        chars,
    });
    debug!(target: "narrator", session = id, units = units.len(), chunked, "Narration started");

    // Give the backend a moment to settle after cancelling the previous session
    if superseded_previous && !shared.config.supersede_settle.is_zero() {
        tokio::time::sleep(shared.config.supersede_settle).await;
    }

    let outcome = if chunked {
        shared.play_chunked(id, &units).await
    } else {
        shared.play_single(id, &units[0]).await
    };
    shared.finish(id, outcome);
}

impl Shared {
    fn admit(&self, text: &str) -> Result<(), NarrateError> {
        if text.trim().is_empty() {
            return Err(NarrateError::EmptyText);
        }
        if !self.backend.is_supported() {
            return Err(NarrateError::UnsupportedBackend);
        }
        if let Some(retry_in) = self.lock_breaker().remaining_cooldown() {
            return Err(NarrateError::CircuitOpen { retry_in });
        }
        Ok(())
    }

    /// Lock the breaker, announcing a cooldown that ran out since it was last consulted.
    fn lock_breaker(&self) -> MutexGuard<'_, FailureTracker> {
        let mut breaker = self.breaker.lock();
        if breaker.close_if_expired() {
            info!(target: "narrator", "Cooldown elapsed; speech synthesis re-enabled");
            self.events.publish(NarrationEvent::BreakerClosed);
        }
        breaker
    }

    fn reject(&self, err: &NarrateError) {
        match err {
            NarrateError::EmptyText => debug!(target: "narrator", "Ignoring empty text"),
            _ => warn!(target: "narrator", reason = err.kind(), "{}", err),
        }
        self.stats.incr(Counter::Rejection);
        self.events.publish(NarrationEvent::Rejected {
            reason: err.kind().to_string(),
        });
    }

    async fn play_single(&self, id: u64, unit: &str) -> NarrationOutcome {
        match self.speak_unit(id, 0, unit).await {
            Ok(()) => NarrationOutcome::Completed {
                units: 1,
                failed_units: 0,
            },
            Err(UnitError::Backend(err)) => {
                NarrationOutcome::Aborted(NarrateError::SingleShotSynthesis(err))
            }
            Err(UnitError::Timeout(deadline)) => {
                NarrationOutcome::Aborted(NarrateError::Timeout { deadline })
            }
        }
    }

    async fn play_chunked(&self, id: u64, units: &[String]) -> NarrationOutcome {
        let mut failed_units = 0;
        for (index, unit) in units.iter().enumerate() {
            if index > 0 && !self.config.unit_pause.is_zero() {
                tokio::time::sleep(self.config.unit_pause).await;
            }
            match self.speak_unit(id, index, unit).await {
                Ok(()) => {}
                Err(UnitError::Backend(source)) => {
                    failed_units += 1;
                    let err = NarrateError::UnitSynthesis { index, source };
                    warn!(target: "narrator", session = id, "{}; moving to next unit", err);
                }
                Err(UnitError::Timeout(deadline)) => {
                    return NarrationOutcome::Aborted(NarrateError::Timeout { deadline });
                }
            }
        }
        NarrationOutcome::Completed {
            units: units.len(),
            failed_units,
        }
    }

    async fn speak_unit(&self, id: u64, index: usize, unit: &str) -> Result<(), UnitError> {
        let unit = unit.trim();
        if unit.is_empty() {
            return Ok(());
        }

        let deadline = watchdog::deadline_for(unit, &self.config.watchdog);
        let (expired_tx, expired_rx) = oneshot::channel();
        let mut watchdog = Watchdog::new();
        watchdog.arm(deadline, move || {
            let _ = expired_tx.send(());
        });
        debug!(target: "narrator", session = id, index, ?deadline, "Submitting unit");

        let result = tokio::select! {
            result = self.backend.speak(unit) => {
                watchdog.disarm();
                result.map_err(UnitError::Backend)
            }
            Ok(()) = expired_rx => Err(UnitError::Timeout(deadline)),
        };

        match &result {
            Ok(()) => {
                self.lock_breaker().record_success();
                self.stats.incr(Counter::UnitCompleted);
                self.events
                    .publish(NarrationEvent::UnitCompleted { session: id, index });
            }
            Err(UnitError::Backend(err)) => {
                warn!(target: "narrator", session = id, index, kind = err.kind(), "Speech synthesis error: {}", err);
                self.stats.incr(Counter::UnitFailed);
                self.events.publish(NarrationEvent::UnitFailed {
                    session: id,
                    index,
                    kind: err.kind().to_string(),
                    detail: err.to_string(),
                });
                self.record_failure(FailureKind::from(err));
            }
            Err(UnitError::Timeout(deadline)) => {
                warn!(
                    target: "narrator",
                    session = id,
                    index,
                    busy = self.backend.is_busy(),
                    ?deadline,
                    "No completion from backend before deadline; forcing stop"
                );
                self.backend.cancel_all();
                self.stats.incr(Counter::UnitTimedOut);
                self.events.publish(NarrationEvent::UnitTimedOut {
                    session: id,
                    index,
                    deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                });
                self.record_failure(FailureKind::Timeout);
            }
        }
        result
    }

    fn record_failure(&self, kind: FailureKind) {
        let (tripped, failures) = {
            let mut breaker = self.lock_breaker();
            (breaker.record_failure(&kind), breaker.consecutive_failures())
        };
        if tripped {
            warn!(
                target: "narrator",
                failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                "Speech synthesis failed {} times in a row. Temporarily disabling.",
                failures
            );
            self.stats.incr(Counter::BreakerTrip);
            self.events.publish(NarrationEvent::BreakerOpened {
                cooldown_ms: u64::try_from(self.config.cooldown.as_millis()).unwrap_or(u64::MAX),
            });
        }
    }

    /// Tear down session `id` if it still owns the slot.
    fn finish(&self, id: u64, outcome: NarrationOutcome) {
        let on_done = {
            let mut slot = self.session.lock();
            if slot.as_ref().map(|s| s.id) != Some(id) {
                debug!(target: "narrator", session = id, "Session already torn down");
                return;
            }
            let Some(session) = slot.take() else {
                return;
            };
            self.animation.release(id);
            session.on_done
        };

        match &outcome {
            NarrationOutcome::Completed { units, failed_units } => {
                self.stats.incr(Counter::SessionCompleted);
                info!(target: "narrator", session = id, units, failed_units, "Narration finished");
            }
            NarrationOutcome::Aborted(err) => {
                self.stats.incr(Counter::SessionAborted);
                warn!(target: "narrator", session = id, reason = err.kind(), "Narration aborted: {}", err);
            }
        }
        self.events.publish(NarrationEvent::finished(id, &outcome));
        on_done();
    }

    /// Stop a session from outside its task. Caller holds the slot lock and
    /// must invoke the returned callback once the lock is released.
    fn cancel_session(&self, session: ActiveSession, reason: NarrateError) -> DoneCallback {
        session.task.abort();
        self.backend.cancel_all();
        self.animation.release(session.id);

        self.stats.incr(Counter::Cancellation);
        self.stats.incr(Counter::SessionAborted);
        info!(target: "narrator", session = session.id, reason = reason.kind(), "Narration cancelled");
        self.events.publish(NarrationEvent::finished(
            session.id,
            &NarrationOutcome::Aborted(reason),
        ));
        session.on_done
    }

    fn silence(&self) {
        if self.backend.is_supported() {
            self.backend.cancel_all();
        }
        self.animation.release_all();
    }
}
