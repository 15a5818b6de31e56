//! Shared test doubles for narrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use narrate_core::{Animator, SynthesisBackend, SynthesisError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{sleep, Duration};

// =============================================================================
// Scripted synthesis backend
// =============================================================================

/// What the backend does with a unit
#[derive(Debug, Clone)]
pub enum Step {
    /// Finish after the given playback time
    Ok(Duration),
    /// Report a substantive error with this kind
    Fail(&'static str),
    /// Report an interruption
    Interrupted,
    /// Never fire a completion event
    Hang,
}

/// Backend whose behavior per unit is chosen by substring rules.
pub struct ScriptedBackend {
    supported: bool,
    rules: Vec<(String, Step)>,
    default_step: Step,
    spoken: Mutex<Vec<String>>,
    cancels: AtomicUsize,
    busy: AtomicBool,
    cancel: Notify,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            supported: true,
            rules: Vec::new(),
            default_step: Step::Ok(Duration::from_millis(50)),
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            busy: AtomicBool::new(false),
            cancel: Notify::new(),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Units containing `pattern` follow `step`
    pub fn on(mut self, pattern: &str, step: Step) -> Self {
        self.rules.push((pattern.to_string(), step));
        self
    }

    pub fn otherwise(mut self, step: Step) -> Self {
        self.default_step = step;
        self
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    fn step_for(&self, unit: &str) -> Step {
        self.rules
            .iter()
            .find(|(pattern, _)| unit.contains(pattern.as_str()))
            .map(|(_, step)| step.clone())
            .unwrap_or_else(|| self.default_step.clone())
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl SynthesisBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    async fn speak(&self, unit: &str) -> Result<(), SynthesisError> {
        self.spoken.lock().push(unit.to_string());
        self.busy.store(true, Ordering::SeqCst);
        let _guard = BusyGuard(&self.busy);

        match self.step_for(unit) {
            Step::Ok(playback) => {
                tokio::select! {
                    _ = sleep(playback) => Ok(()),
                    _ = self.cancel.notified() => Err(SynthesisError::Interrupted),
                }
            }
            Step::Fail(kind) => Err(SynthesisError::failed(kind, "scripted failure")),
            Step::Interrupted => Err(SynthesisError::Interrupted),
            Step::Hang => {
                self.cancel.notified().await;
                Err(SynthesisError::Interrupted)
            }
        }
    }

    fn cancel_all(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancel.notify_waiters();
    }
}

// =============================================================================
// Recording animator
// =============================================================================

/// Animator that records every start/stop call in order
#[derive(Default)]
pub struct RecordingAnimator {
    log: Mutex<Vec<String>>,
    animating: AtomicBool,
}

impl RecordingAnimator {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl Animator for RecordingAnimator {
    fn start(&self, text: &str) {
        self.log.lock().push(format!("start:{}", text));
        self.animating.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.log.lock().push("stop".to_string());
        self.animating.store(false, Ordering::SeqCst);
    }

    fn is_animating(&self) -> bool {
        self.animating.load(Ordering::SeqCst)
    }

    fn current_openness(&self) -> f32 {
        if self.is_animating() {
            0.5
        } else {
            0.0
        }
    }
}

// =============================================================================
// Completion counting
// =============================================================================

/// Counts how many times a completion callback fired
#[derive(Clone, Default)]
pub struct DoneCounter(Arc<AtomicUsize>);

impl DoneCounter {
    pub fn callback(&self) -> impl FnOnce() + Send + 'static {
        let count = Arc::clone(&self.0);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A sentence-rich text long enough to be chunked (114 chars)
pub const LONG_TEXT: &str = "The quick brown fox jumps over the lazy dog near the river bank. \
It was a bright and sunny day! Did anyone notice?";
