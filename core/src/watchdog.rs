//! One-shot deadline timer guarding a single utterance.

use crate::config::WatchdogConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Deadline for speaking `text`: `min(chars * per_char, max_estimate) + buffer`.
pub fn deadline_for(text: &str, cfg: &WatchdogConfig) -> Duration {
    let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    let estimate = cfg.per_char.saturating_mul(chars).min(cfg.max_estimate);
    estimate + cfg.buffer
}

/// Fires its callback once, after a delay, unless disarmed first.
///
/// Dropping an armed watchdog disarms it.
#[derive(Debug, Default)]
pub struct Watchdog {
    timer: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer. Re-arming disarms the previous deadline first.
    pub fn arm<F>(&mut self, after: Duration, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.disarm();
        let fired = Arc::new(AtomicBool::new(false));
        self.fired = Arc::clone(&fired);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if !fired.swap(true, Ordering::SeqCst) {
                on_expire();
            }
        }));
    }

    /// Cancel the pending deadline. Returns `true` if it had not fired yet.
    ///
    /// Safe to call any number of times, including after expiry.
    pub fn disarm(&mut self) -> bool {
        let Some(timer) = self.timer.take() else {
            return false;
        };
        timer.abort();
        // Claim the flag so a timer racing with abort cannot run the callback
        !self.fired.swap(true, Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some() && !self.fired.load(Ordering::SeqCst)
    }

    pub fn has_fired(&self) -> bool {
        self.timer.is_some() && self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
