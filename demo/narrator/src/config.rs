use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use narrate_audio::{CliBackendConfig, LipSyncConfig};
use narrate_core::NarratorConfig;

/// High-level configuration for the narrator demo
#[derive(Clone, Debug)]
pub struct NarratorAppConfig {
    pub narrator: NarratorConfig,
    pub tts: CliBackendConfig,
    pub lipsync: LipSyncConfig,
    /// Print every narration event as a JSON line on stdout
    pub print_events: bool,
}

impl Default for NarratorAppConfig {
    fn default() -> Self {
        // Component defaults already consider env vars
        Self {
            narrator: NarratorConfig::from_env(),
            tts: CliBackendConfig::from_env(),
            lipsync: LipSyncConfig::default(),
            print_events: std::env::var("NARRATOR_PRINT_EVENTS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

impl NarratorAppConfig {
    /// Load configuration from a TOML file (path via NARRATOR_CONFIG or ./narrator.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("NARRATOR_CONFIG").unwrap_or_else(|_| "narrator.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "narrator", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match Self::from_toml_str(&s, default.clone()) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(target: "narrator", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "narrator", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    fn from_toml_str(s: &str, base: Self) -> Result<Self, toml::de::Error> {
        Ok(toml::from_str::<NarratorAppToml>(s)?.overlay(base))
    }
}

// TOML overlay definitions

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct NarratorAppToml {
    pub print_events: Option<bool>,
    pub narrator: Option<NarratorToml>,
    pub tts: Option<TtsToml>,
    pub lipsync: Option<LipSyncToml>,
}

impl NarratorAppToml {
    fn overlay(self, mut base: NarratorAppConfig) -> NarratorAppConfig {
        if let Some(p) = self.print_events {
            base.print_events = p;
        }
        if let Some(n) = self.narrator {
            n.apply(&mut base.narrator);
        }
        if let Some(t) = self.tts {
            t.apply(&mut base.tts);
        }
        if let Some(l) = self.lipsync {
            l.apply(&mut base.lipsync);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct NarratorToml {
    pub chunk_threshold_chars: Option<usize>,
    pub unit_pause_ms: Option<u64>,
    pub supersede_settle_ms: Option<u64>,
    pub watchdog_per_char_ms: Option<u64>,
    pub watchdog_max_ms: Option<u64>,
    pub watchdog_buffer_ms: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub cooldown_secs: Option<u64>,
}

impl NarratorToml {
    fn apply(self, n: &mut NarratorConfig) {
        if let Some(x) = self.chunk_threshold_chars {
            n.chunk_threshold_chars = x;
        }
        if let Some(x) = self.unit_pause_ms {
            n.unit_pause = Duration::from_millis(x);
        }
        if let Some(x) = self.supersede_settle_ms {
            n.supersede_settle = Duration::from_millis(x);
        }
        if let Some(x) = self.watchdog_per_char_ms {
            n.watchdog.per_char = Duration::from_millis(x);
        }
        if let Some(x) = self.watchdog_max_ms {
            n.watchdog.max_estimate = Duration::from_millis(x);
        }
        if let Some(x) = self.watchdog_buffer_ms {
            n.watchdog.buffer = Duration::from_millis(x);
        }
        if let Some(x) = self.failure_threshold.filter(|&x| x > 0) {
            n.failure_threshold = x;
        }
        if let Some(x) = self.cooldown_secs {
            n.cooldown = Duration::from_secs(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TtsToml {
    pub voice: Option<String>,
    pub rate: Option<f32>,
    pub volume: Option<f32>,
    pub sample_rate: Option<u32>,
    pub player: Option<String>,
    pub temp_dir: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
}

impl TtsToml {
    fn apply(self, t: &mut CliBackendConfig) {
        if let Some(x) = self.voice {
            t.voice = x;
        }
        if let Some(x) = self.rate {
            t.rate = x;
        }
        if let Some(x) = self.volume {
            t.volume = x;
        }
        if let Some(x) = self.sample_rate {
            t.sample_rate = x;
        }
        if let Some(x) = self.player {
            t.player = Some(x);
        }
        if let Some(x) = self.temp_dir {
            t.temp_dir = x;
        }
        if let Some(x) = self.piper_voice {
            t.piper_voice = Some(x);
        }
        if let Some(x) = self.piper_voice_dir {
            t.piper_voice_dir = Some(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LipSyncToml {
    pub chars_per_second: Option<f32>,
    pub smoothing: Option<f32>,
}

impl LipSyncToml {
    fn apply(self, l: &mut LipSyncConfig) {
        if let Some(x) = self.chars_per_second {
            l.chars_per_second = x;
        }
        if let Some(x) = self.smoothing {
            l.smoothing = x;
        }
    }
}
