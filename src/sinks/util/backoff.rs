use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use rand::Rng;
use serde::{Deserialize, Serialize};
use stream_cancel::Tripwire;

use crate::internal_events::BackoffWaiting;

/// Bounds for the delay applied after a failed publish.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct BackoffConfig {
    pub init_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_ms: 1_000,
            max_ms: 60_000,
        }
    }
}

impl BackoffConfig {
    pub const fn init(&self) -> Duration {
        Duration::from_millis(self.init_ms)
    }

    pub const fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

/// Exponential backoff with equal jitter.
///
/// Each wait sleeps for half of the current duration plus a random share of
/// the other half, then doubles the duration up to `max`. A successful
/// publish resets it. Waiting stops early once `done` trips.
pub struct EqualJitterBackoff {
    duration: Mutex<Duration>,
    init: Duration,
    max: Duration,
    done: Tripwire,
}

impl EqualJitterBackoff {
    pub fn new(done: Tripwire, init: Duration, max: Duration) -> Self {
        Self {
            duration: Mutex::new(init * 2),
            init,
            max,
            done,
        }
    }

    pub fn reset(&self) {
        *self.duration.lock().unwrap_or_else(PoisonError::into_inner) = self.init * 2;
    }

    /// Computes the next delay and advances the internal duration.
    fn next_delay(&self) -> Duration {
        let mut duration = self.duration.lock().unwrap_or_else(PoisonError::into_inner);

        let half = duration.as_nanos() as u64 / 2;
        let jitter = if half > 0 {
            rand::rng().random_range(0..half)
        } else {
            0
        };
        let delay = Duration::from_nanos(half + jitter);

        *duration = (*duration * 2).min(self.max);
        delay
    }

    /// Sleeps for the next delay. Returns `false` if shutdown interrupted it.
    pub async fn wait(&self) -> bool {
        let delay = self.next_delay();
        emit!(BackoffWaiting { delay });

        tokio::select! {
            _ = self.done.clone() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Resets on success and waits on failure.
    pub async fn wait_on_error(&self, failed: bool) -> bool {
        if !failed {
            self.reset();
            return true;
        }
        self.wait().await
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Duration {
        *self.duration.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
