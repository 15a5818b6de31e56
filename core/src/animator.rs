//! Mouth-animation collaborator and the binding that keeps it in step with
//! the narration timeline.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Lip-sync animation driven by the narrator.
///
/// Rendering lives outside this crate; implementations only need to react
/// to the start/stop bracket around each narration.
#[cfg_attr(test, mockall::automock)]
pub trait Animator: Send + Sync {
    /// Begin animating for the full text of a narration.
    fn start(&self, text: &str);
    fn stop(&self);
    fn is_animating(&self) -> bool;
    /// Current mouth openness in `0.0..=1.0`.
    fn current_openness(&self) -> f32;
}

/// Animator for headless setups.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAnimator;

impl Animator for NullAnimator {
    fn start(&self, _text: &str) {}
    fn stop(&self) {}
    fn is_animating(&self) -> bool {
        false
    }
    fn current_openness(&self) -> f32 {
        0.0
    }
}

/// Ties the animator to the session that started it.
///
/// Only the owning session can stop the animation, so a session that was
/// superseded cannot cut off its successor's animation on its way out.
pub struct AnimationBinding {
    animator: Arc<dyn Animator>,
    owner: Mutex<Option<u64>>,
}

impl AnimationBinding {
    pub fn new(animator: Arc<dyn Animator>) -> Self {
        Self {
            animator,
            owner: Mutex::new(None),
        }
    }

    /// Start animating `text` on behalf of `session`, stopping any previous owner first.
    pub fn bind(&self, session: u64, text: &str) {
        let mut owner = self.owner.lock();
        if let Some(previous) = owner.take() {
            debug!(target: "narrator", session = previous, "Stopping animation of previous session");
            self.animator.stop();
        }
        self.animator.start(text);
        *owner = Some(session);
    }

    /// Stop the animation if `session` still owns it. Returns whether it did.
    pub fn release(&self, session: u64) -> bool {
        let mut owner = self.owner.lock();
        if *owner != Some(session) {
            return false;
        }
        *owner = None;
        self.animator.stop();
        true
    }

    /// Stop the animation regardless of owner.
    pub fn release_all(&self) {
        self.owner.lock().take();
        self.animator.stop();
    }

    pub fn owner(&self) -> Option<u64> {
        *self.owner.lock()
    }

    pub fn is_animating(&self) -> bool {
        self.animator.is_animating()
    }

    pub fn current_openness(&self) -> f32 {
        self.animator.current_openness()
    }
}
