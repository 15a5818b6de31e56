use std::time::Duration;
use thiserror::Error;

/// Error reported by a synthesis backend for a single unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    /// Playback was cut short by `cancel_all()` or a newer utterance
    #[error("synthesis interrupted")]
    Interrupted,

    #[error("synthesis cancelled")]
    Cancelled,

    #[error("synthesis failed ({kind}): {message}")]
    Failed { kind: String, message: String },
}

impl SynthesisError {
    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable kind, as reported in events and logs.
    pub fn kind(&self) -> &str {
        match self {
            SynthesisError::Interrupted => "interrupted",
            SynthesisError::Cancelled => "cancelled",
            SynthesisError::Failed { kind, .. } => kind,
        }
    }

    /// Interruptions and cancellations are caused by the caller, not the backend.
    pub fn is_substantive(&self) -> bool {
        matches!(self, SynthesisError::Failed { .. })
    }
}

/// Every way a narration request can go wrong.
///
/// None of these reach the caller of `Narrator::speak`; they are logged,
/// published as events and folded into a [`NarrationOutcome`](crate::NarrationOutcome).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NarrateError {
    #[error("text is empty")]
    EmptyText,

    #[error("speech synthesis is not supported by the backend")]
    UnsupportedBackend,

    #[error("speech synthesis temporarily disabled for another {retry_in:?}")]
    CircuitOpen { retry_in: Duration },

    #[error("unit {index} failed: {source}")]
    UnitSynthesis {
        index: usize,
        #[source]
        source: SynthesisError,
    },

    #[error("utterance failed: {0}")]
    SingleShotSynthesis(#[source] SynthesisError),

    #[error("no completion from backend within {deadline:?}")]
    Timeout { deadline: Duration },

    #[error("narration cancelled")]
    Cancelled,

    #[error("narration superseded by a newer request")]
    Superseded,
}

impl NarrateError {
    /// Short machine-readable kind, as reported in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NarrateError::EmptyText => "empty-text",
            NarrateError::UnsupportedBackend => "unsupported-backend",
            NarrateError::CircuitOpen { .. } => "circuit-open",
            NarrateError::UnitSynthesis { .. } => "unit-synthesis-error",
            NarrateError::SingleShotSynthesis(_) => "single-shot-synthesis-error",
            NarrateError::Timeout { .. } => "timeout",
            NarrateError::Cancelled => "cancelled",
            NarrateError::Superseded => "superseded",
        }
    }
}

pub type Result<T> = std::result::Result<T, NarrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_error_kinds() {
        assert_eq!(SynthesisError::Interrupted.kind(), "interrupted");
        assert_eq!(SynthesisError::Cancelled.kind(), "cancelled");
        let err = SynthesisError::failed("synthesis-error", "engine crashed");
        assert_eq!(err.kind(), "synthesis-error");
        assert!(err.is_substantive());
        assert!(!SynthesisError::Interrupted.is_substantive());
        assert!(!SynthesisError::Cancelled.is_substantive());
    }

    #[test]
    fn test_narrate_error_display() {
        let err = NarrateError::UnitSynthesis {
            index: 2,
            source: SynthesisError::failed("network", "reset by peer"),
        };
        assert_eq!(
            err.to_string(),
            "unit 2 failed: synthesis failed (network): reset by peer"
        );
        assert_eq!(err.kind(), "unit-synthesis-error");
    }
}
