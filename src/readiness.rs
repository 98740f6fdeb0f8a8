use std::time::Duration;

use tracing::{error, info};

pub const DEFAULT_MAX_RETRIES: u32 = 30;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Blocks the current thread between readiness attempts
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Bounded retry loop that waits for a dependency to answer
pub struct ReadinessGate<'a> {
    max_retries: u32,
    interval: Duration,
    sleeper: &'a dyn Sleeper,
}

impl<'a> ReadinessGate<'a> {
    pub fn new(max_retries: u32, interval: Duration, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            max_retries,
            interval,
            sleeper,
        }
    }

    /// Probe up to `max_retries` times, sleeping `interval` between attempts.
    ///
    /// A probe error counts as "not ready". Returns whether the dependency
    /// answered; exhaustion is left for the caller to judge.
    pub fn await_ready<F>(&self, name: &str, mut probe: F) -> bool
    where
        F: FnMut() -> anyhow::Result<bool>,
    {
        info!(service = name, "Waiting for service");
        for attempt in 1..=self.max_retries {
            match probe() {
                Ok(true) => {
                    info!(service = name, attempt, "Service available");
                    return true;
                }
                Ok(false) => {
                    info!(service = name, attempt, max = self.max_retries, "Service not ready");
                }
                Err(e) => {
                    info!(service = name, attempt, max = self.max_retries, error = %format!("{:#}", e), "Readiness probe failed");
                }
            }
            if attempt < self.max_retries {
                self.sleeper.sleep(self.interval);
            }
        }
        error!(service = name, attempts = self.max_retries, "Service unavailable after all attempts");
        false
    }
}
