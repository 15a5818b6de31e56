// Loom Narrate Core
// Narration playback orchestration: chunking, watchdog, circuit breaker, lip-sync bracket

pub mod animator;
pub mod backend;
pub mod breaker;
pub mod chunker;
pub mod config;
pub mod error;
pub mod events;
pub mod narrator;
pub mod telemetry;
pub mod watchdog;

// Export core types
pub use animator::{AnimationBinding, Animator, NullAnimator};
pub use backend::SynthesisBackend;
pub use breaker::{FailureKind, FailureTracker};
pub use config::{NarratorConfig, WatchdogConfig};
pub use error::{NarrateError, Result, SynthesisError};
pub use events::{NarrationEvent, NarrationOutcome};
pub use narrator::{Narrator, PlaybackState};
pub use telemetry::NarrationStats;
pub use watchdog::Watchdog;
