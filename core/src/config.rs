use std::time::Duration;

/// Tuning knobs for the narration orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub struct NarratorConfig {
    /// Texts longer than this many characters are split into sentences
    pub chunk_threshold_chars: usize,
    /// Pause between consecutive units of a chunked narration
    pub unit_pause: Duration,
    /// Delay before the first unit when a session superseded another one
    pub supersede_settle: Duration,
    pub watchdog: WatchdogConfig,
    /// Consecutive failures that open the circuit breaker
    pub failure_threshold: u32,
    /// How long the breaker stays open before closing on its own
    pub cooldown: Duration,
    /// Capacity of the narration event broadcast channel
    pub event_capacity: usize,
}

/// Per-unit deadline estimate: `min(chars * per_char, max_estimate) + buffer`.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchdogConfig {
    pub per_char: Duration,
    pub max_estimate: Duration,
    pub buffer: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            per_char: Duration::from_millis(50),
            max_estimate: Duration::from_millis(10_000),
            buffer: Duration::from_millis(1_000),
        }
    }
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_chars: 100,
            unit_pause: Duration::from_millis(200),
            supersede_settle: Duration::from_millis(100),
            watchdog: WatchdogConfig::default(),
            failure_threshold: 3,
            cooldown: Duration::from_secs(5 * 60),
            event_capacity: 256,
        }
    }
}

impl NarratorConfig {
    /// Defaults overlaid with `NARRATE_*` environment variables.
    ///
    /// Env overrides:
    /// - NARRATE_CHUNK_THRESHOLD, NARRATE_UNIT_PAUSE_MS, NARRATE_SETTLE_MS
    /// - NARRATE_WATCHDOG_PER_CHAR_MS, NARRATE_WATCHDOG_MAX_MS, NARRATE_WATCHDOG_BUFFER_MS
    /// - NARRATE_FAILURE_THRESHOLD, NARRATE_COOLDOWN_SECS
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<usize>("NARRATE_CHUNK_THRESHOLD") {
            cfg.chunk_threshold_chars = v;
        }
        if let Some(v) = env_parse::<u64>("NARRATE_UNIT_PAUSE_MS") {
            cfg.unit_pause = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("NARRATE_SETTLE_MS") {
            cfg.supersede_settle = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("NARRATE_WATCHDOG_PER_CHAR_MS") {
            cfg.watchdog.per_char = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("NARRATE_WATCHDOG_MAX_MS") {
            cfg.watchdog.max_estimate = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("NARRATE_WATCHDOG_BUFFER_MS") {
            cfg.watchdog.buffer = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("NARRATE_FAILURE_THRESHOLD").filter(|&v| v > 0) {
            cfg.failure_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("NARRATE_COOLDOWN_SECS") {
            cfg.cooldown = Duration::from_secs(v);
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let cfg = NarratorConfig::default();
        assert_eq!(cfg.chunk_threshold_chars, 100);
        assert_eq!(cfg.unit_pause, Duration::from_millis(200));
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.cooldown, Duration::from_secs(300));
        assert_eq!(cfg.watchdog.max_estimate, Duration::from_secs(10));
        assert_eq!(cfg.watchdog.buffer, Duration::from_secs(1));
    }
}
