//! Externally imposed per-backend cooldowns (rate limits).
//!
//! Separate from [`HealthMonitor`](super::HealthMonitor): a rate-limited
//! backend is not unhealthy, it just must not be called before its
//! retry time.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Retry-at times keyed by backend id
#[derive(Debug, Default)]
pub struct ProviderCooldowns {
    retry_at: Mutex<HashMap<String, Instant>>,
}

impl ProviderCooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.retry_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block `backend_id` until `retry_at`. An earlier retry time never
    /// shortens an existing cooldown.
    pub fn set_retry_at(&self, backend_id: &str, retry_at: Instant) {
        let mut map = self.lock();
        let slot = map.entry(backend_id.to_string()).or_insert(retry_at);
        if retry_at > *slot {
            *slot = retry_at;
        }
    }

    /// Block `backend_id` for `duration` from now.
    pub fn impose(&self, backend_id: &str, duration: Duration) {
        debug!(backend = %backend_id, secs = duration.as_secs_f64(), "Cooldown imposed");
        self.set_retry_at(backend_id, Instant::now() + duration);
    }

    /// Whether `backend_id` is still waiting out a cooldown.
    pub fn is_cooling_down(&self, backend_id: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .get(backend_id)
            .is_some_and(|retry_at| now < *retry_at)
    }

    /// Time left before `backend_id` may be called, if any.
    pub fn remaining(&self, backend_id: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .get(backend_id)
            .and_then(|retry_at| retry_at.checked_duration_since(now))
            .filter(|d| !d.is_zero())
    }

    /// Drop any cooldown for `backend_id`.
    pub fn clear(&self, backend_id: &str) {
        self.lock().remove(backend_id);
    }
}
