use crate::error::SynthesisError;
use async_trait::async_trait;

/// Speech synthesis capability consumed by the narrator.
///
/// `speak` resolves once per submitted unit: `Ok` when playback ended,
/// `Err` when the backend reported an error. A backend that stalls simply
/// never resolves; the narrator's watchdog takes care of that case.
/// Dropping the future must stop the unit's audio.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Stable name for logs and events
    fn name(&self) -> &str;

    /// Whether the environment can synthesize speech at all.
    fn is_supported(&self) -> bool;

    /// Whether audio is currently being produced.
    fn is_busy(&self) -> bool;

    async fn speak(&self, unit: &str) -> Result<(), SynthesisError>;

    /// Stop all queued and playing audio. In-flight `speak` calls resolve
    /// with [`SynthesisError::Interrupted`] or are dropped by the caller.
    fn cancel_all(&self);
}
