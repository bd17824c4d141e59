//! Reconnect scheduling
//!
//! One optional retry timer per channel with a constant interval. A failure
//! while a retry is pending resets that timer instead of adding another.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

#[derive(Debug)]
pub struct ReconnectScheduler {
    enabled: bool,
    interval: Duration,
    timer: Option<Pin<Box<Sleep>>>,
}

impl ReconnectScheduler {
    pub fn new(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval,
            timer: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Toggle auto-reconnect; disabling cancels a pending retry
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.cancel();
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The connect attempt failed. Returns the retry delay when one was scheduled.
    pub fn on_failure(&mut self) -> Option<Duration> {
        self.schedule()
    }

    /// An established connection closed. Returns the retry delay when one was scheduled.
    pub fn on_close(&mut self) -> Option<Duration> {
        self.schedule()
    }

    fn schedule(&mut self) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let deadline = Instant::now() + self.interval;
        match self.timer.as_mut() {
            Some(timer) => timer.as_mut().reset(deadline),
            None => self.timer = Some(Box::pin(sleep(self.interval))),
        }
        Some(self.interval)
    }

    /// Drop the pending retry, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.timer.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// Resolves when the pending retry is due, then clears it.
    ///
    /// Never resolves while nothing is pending. Cancel-safe: dropping the
    /// future before it resolves keeps the timer.
    pub async fn fired(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.as_mut().await;
                self.timer = None;
            }
            None => pending::<()>().await,
        }
    }
}
