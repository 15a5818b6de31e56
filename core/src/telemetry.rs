// Telemetry: tracing setup and narration counters
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Snapshot of narration counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationStats {
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_aborted: u64,
    pub units_completed: u64,
    pub units_failed: u64,
    pub units_timed_out: u64,
    pub cancellations: u64,
    pub rejections: u64,
    pub breaker_trips: u64,
}

/// Lock-free counters behind [`NarrationStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    sessions_started: AtomicU64,
    sessions_completed: AtomicU64,
    sessions_aborted: AtomicU64,
    units_completed: AtomicU64,
    units_failed: AtomicU64,
    units_timed_out: AtomicU64,
    cancellations: AtomicU64,
    rejections: AtomicU64,
    breaker_trips: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    SessionStarted,
    SessionCompleted,
    SessionAborted,
    UnitCompleted,
    UnitFailed,
    UnitTimedOut,
    Cancellation,
    Rejection,
    BreakerTrip,
}

impl StatsCollector {
    pub(crate) fn incr(&self, counter: Counter) {
        let slot = match counter {
            Counter::SessionStarted => &self.sessions_started,
            Counter::SessionCompleted => &self.sessions_completed,
            Counter::SessionAborted => &self.sessions_aborted,
            Counter::UnitCompleted => &self.units_completed,
            Counter::UnitFailed => &self.units_failed,
            Counter::UnitTimedOut => &self.units_timed_out,
            Counter::Cancellation => &self.cancellations,
            Counter::Rejection => &self.rejections,
            Counter::BreakerTrip => &self.breaker_trips,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> NarrationStats {
        NarrationStats {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            sessions_aborted: self.sessions_aborted.load(Ordering::Relaxed),
            units_completed: self.units_completed.load(Ordering::Relaxed),
            units_failed: self.units_failed.load(Ordering::Relaxed),
            units_timed_out: self.units_timed_out.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            breaker_trips: self.breaker_trips.load(Ordering::Relaxed),
        }
    }
}

impl NarrationStats {
    /// Print stats to log
    pub fn log(&self) {
        info!(target: "telemetry", "=== Narration stats ===");
        info!(target: "telemetry", "Sessions: {} started, {} completed, {} aborted",
            self.sessions_started, self.sessions_completed, self.sessions_aborted);
        info!(target: "telemetry", "Units: {} ok, {} failed, {} timed out",
            self.units_completed, self.units_failed, self.units_timed_out);
        info!(target: "telemetry", "Cancellations: {}", self.cancellations);
        info!(target: "telemetry", "Rejections: {}", self.rejections);
        info!(target: "telemetry", "Breaker trips: {}", self.breaker_trips);
    }
}

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
///
/// Returns an error if a global subscriber is already set.
pub fn init_tracing(default_filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    info!(target: "telemetry", filter = %default_filter, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = StatsCollector::default();
        stats.incr(Counter::SessionStarted);
        stats.incr(Counter::SessionStarted);
        stats.incr(Counter::UnitFailed);
        stats.incr(Counter::BreakerTrip);

        let snap = stats.snapshot();
        assert_eq!(snap.sessions_started, 2);
        assert_eq!(snap.units_failed, 1);
        assert_eq!(snap.breaker_trips, 1);
        assert_eq!(snap.units_completed, 0);
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing("warn");
        assert!(init_tracing("warn").is_err());
    }
}
