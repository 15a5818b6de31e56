// Audio collaborators for the narrator

// Shared audio utilities
pub(crate) mod utils;

pub mod lipsync;
pub mod tts;

pub use lipsync::{LipSyncConfig, TextLipSync};
pub use tts::{CliBackendConfig, CliSynthesisBackend, Engine};
