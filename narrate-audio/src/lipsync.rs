//! Text-driven lip sync.
//!
//! Without access to the audio signal the mouth follows the narration text
//! at a fixed reading speed: vowels open the mouth, consonants half-open it,
//! whitespace and punctuation close it. Openness is smoothed so consecutive
//! reads glide between shapes instead of snapping.

use narrate_core::Animator;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct LipSyncConfig {
    /// Characters "spoken" per second while animating
    pub chars_per_second: f32,
    /// Weight of the new target on each read, in `0.0..=1.0`
    pub smoothing: f32,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            chars_per_second: 14.0,
            smoothing: 0.3,
        }
    }
}

#[derive(Debug, Default)]
struct LipSyncState {
    text: Vec<char>,
    started_at: Option<Instant>,
    openness: f32,
}

pub struct TextLipSync {
    cfg: LipSyncConfig,
    state: Mutex<LipSyncState>,
}

impl TextLipSync {
    pub fn new(cfg: LipSyncConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(LipSyncState::default()),
        }
    }
}

impl Default for TextLipSync {
    fn default() -> Self {
        Self::new(LipSyncConfig::default())
    }
}

/// Target openness for a single character.
fn mouth_target(c: char) -> f32 {
    match c.to_ascii_lowercase() {
        'a' | 'o' => 1.0,
        'e' | 'i' | 'u' | 'y' => 0.8,
        c if c.is_alphabetic() => 0.5,
        c if c.is_numeric() => 0.5,
        _ => 0.0,
    }
}

impl Animator for TextLipSync {
    fn start(&self, text: &str) {
        let mut state = self.state.lock();
        state.text = text.chars().collect();
        state.started_at = Some(Instant::now());
        debug!(target: "lipsync", chars = state.text.len(), "Animation started");
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        if state.started_at.take().is_some() {
            debug!(target: "lipsync", "Animation stopped");
        }
        state.text.clear();
        state.openness = 0.0;
    }

    fn is_animating(&self) -> bool {
        self.state.lock().started_at.is_some()
    }

    fn current_openness(&self) -> f32 {
        let mut state = self.state.lock();
        let Some(started_at) = state.started_at else {
            return 0.0;
        };
        let position =
            (started_at.elapsed().as_secs_f32() * self.cfg.chars_per_second.max(0.0)) as usize;
        let target = state.text.get(position).copied().map(mouth_target).unwrap_or(0.0);
        let weight = self.cfg.smoothing.clamp(0.0, 1.0);
        state.openness = (state.openness * (1.0 - weight) + target * weight).clamp(0.0, 1.0);
        state.openness
    }
}
