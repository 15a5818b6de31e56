//! Consecutive-failure tracking with a self-healing circuit breaker.
//!
//! After `threshold` consecutive substantive failures the breaker opens for
//! `cooldown`; while open, the narrator turns requests into no-ops. The
//! breaker closes on its own once the cooldown elapses (clearing the
//! counter) or immediately on [`FailureTracker::reset`].

use crate::error::SynthesisError;
use std::fmt;
use tokio::time::{Duration, Instant};

/// Why a unit did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Backend reported an error for the unit
    Synthesis(String),
    /// Watchdog fired before the backend signalled completion
    Timeout,
    /// Backend playback interrupted (usually by our own `cancel_all`)
    Interrupted,
    /// Caller cancelled or superseded the narration
    Cancelled,
}

impl FailureKind {
    /// Whether this failure moves the breaker towards opening.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(self, FailureKind::Synthesis(_) | FailureKind::Timeout)
    }

    pub fn as_str(&self) -> &str {
        match self {
            FailureKind::Synthesis(kind) => kind,
            FailureKind::Timeout => "timeout",
            FailureKind::Interrupted => "interrupted",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&SynthesisError> for FailureKind {
    fn from(err: &SynthesisError) -> Self {
        match err {
            SynthesisError::Interrupted => FailureKind::Interrupted,
            SynthesisError::Cancelled => FailureKind::Cancelled,
            SynthesisError::Failed { kind, .. } => FailureKind::Synthesis(kind.clone()),
        }
    }
}

#[derive(Debug)]
pub struct FailureTracker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    disabled_until: Option<Instant>,
}

impl FailureTracker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            consecutive_failures: 0,
            disabled_until: None,
        }
    }

    pub fn record_success(&mut self) {
        self.close_if_expired();
        self.consecutive_failures = 0;
    }

    /// Record a failed unit. Returns `true` when this failure opened the breaker.
    pub fn record_failure(&mut self, kind: &FailureKind) -> bool {
        self.close_if_expired();
        if !kind.counts_against_breaker() {
            return false;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.threshold && self.disabled_until.is_none() {
            self.disabled_until = Some(Instant::now() + self.cooldown);
            return true;
        }
        false
    }

    pub fn is_open(&self) -> bool {
        self.disabled_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    pub fn consecutive_failures(&self) -> u32 {
        match self.disabled_until {
            Some(until) if Instant::now() >= until => 0,
            _ => self.consecutive_failures,
        }
    }

    /// Time left until the breaker closes on its own, if it is open.
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let until = self.disabled_until?;
        let now = Instant::now();
        (now < until).then(|| until - now)
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.disabled_until = None;
    }

    /// Close the breaker if its cooldown has run out. Returns `true` only on
    /// the call that actually closed it.
    pub fn close_if_expired(&mut self) -> bool {
        match self.disabled_until {
            Some(until) if Instant::now() >= until => {
                self.reset();
                true
            }
            _ => false,
        }
    }
}
