//! Per-backend health tracking with a timed circuit breaker.
//!
//! A backend that fails [`RouterConfig::max_failures`] times in a row is
//! excluded from candidate selection for the cooldown window. The first
//! availability check after the window has elapsed resets the record, so
//! the breaker heals itself without an external reset call.
//!
//! ```text
//! healthy ──3 failures──▶ cooling down ──cooldown elapsed──▶ healthy (failures = 0)
//!    ▲                          │
//!    └──────── success ─────────┘
//! ```
//!
//! Time is read from [`tokio::time::Instant`], so tests can drive the
//! cooldown with a paused clock.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::RouterConfig;

/// Health state of a single backend
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub available: bool,
    pub consecutive_failures: u32,
    /// Monotonic time of the last success, failure or heal
    pub last_checked_at: Instant,
    /// Wall-clock twin of `last_checked_at`, for status output
    pub last_checked_wall: DateTime<Utc>,
    /// Most recent response times, oldest first
    pub recent_response_times_ms: VecDeque<f64>,
}

impl HealthRecord {
    fn fresh(now: Instant) -> Self {
        Self {
            available: true,
            consecutive_failures: 0,
            last_checked_at: now,
            last_checked_wall: Utc::now(),
            recent_response_times_ms: VecDeque::new(),
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_checked_at = now;
        self.last_checked_wall = Utc::now();
    }

    fn average_response_time(&self) -> Option<f64> {
        if self.recent_response_times_ms.is_empty() {
            return None;
        }
        let sum: f64 = self.recent_response_times_ms.iter().sum();
        Some(sum / self.recent_response_times_ms.len() as f64)
    }
}

/// Serializable view of a backend's health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHealthSnapshot {
    pub available: bool,
    pub consecutive_failures: u32,
    pub avg_response_time_ms: Option<f64>,
    pub last_checked: DateTime<Utc>,
}

/// Tracks health for every backend the router has touched.
///
/// All mutation goes through one lock held only for the duration of a
/// read-modify-write, never across an `.await`, so concurrent routing
/// calls cannot lose failure counts.
#[derive(Debug)]
pub struct HealthMonitor {
    records: Mutex<HashMap<String, HealthRecord>>,
    max_failures: u32,
    cooldown: Duration,
    window: usize,
}

impl HealthMonitor {
    /// Monitor with explicit thresholds.
    pub fn new(max_failures: u32, cooldown: Duration, window: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            max_failures,
            cooldown,
            window: window.max(1),
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(
            config.max_failures,
            config.cooldown(),
            config.response_time_window,
        )
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HealthRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `backend_id` may be selected right now.
    ///
    /// Unknown backends are optimistically available. A backend whose
    /// cooldown has elapsed is reset to healthy as a side effect.
    pub fn is_available(&self, backend_id: &str) -> bool {
        let now = Instant::now();
        let mut records = self.lock();
        let Some(record) = records.get_mut(backend_id) else {
            return true;
        };

        if record.consecutive_failures >= self.max_failures {
            if now.duration_since(record.last_checked_at) >= self.cooldown {
                info!(backend = %backend_id, "Cooldown elapsed, backend eligible again");
                record.available = true;
                record.consecutive_failures = 0;
                record.touch(now);
                return true;
            }
            return false;
        }

        record.available
    }

    /// Record a successful call that took `elapsed_ms`.
    pub fn record_success(&self, backend_id: &str, elapsed_ms: f64) {
        let now = Instant::now();
        let mut records = self.lock();
        let record = records
            .entry(backend_id.to_string())
            .or_insert_with(|| HealthRecord::fresh(now));

        record.available = true;
        record.consecutive_failures = 0;
        record.touch(now);
        record.recent_response_times_ms.push_back(elapsed_ms);
        while record.recent_response_times_ms.len() > self.window {
            record.recent_response_times_ms.pop_front();
        }
    }

    /// Record a failed call. Reaching the threshold starts the cooldown.
    pub fn record_failure(&self, backend_id: &str) {
        let now = Instant::now();
        let mut records = self.lock();
        let record = records
            .entry(backend_id.to_string())
            .or_insert_with(|| HealthRecord::fresh(now));

        record.consecutive_failures += 1;
        record.touch(now);

        if record.consecutive_failures >= self.max_failures {
            record.available = false;
            warn!(
                backend = %backend_id,
                failures = record.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Backend marked unavailable"
            );
        }
    }

    /// Mean of the retained response-time samples.
    pub fn average_response_time(&self, backend_id: &str) -> Option<f64> {
        self.lock()
            .get(backend_id)
            .and_then(HealthRecord::average_response_time)
    }

    /// Consecutive failures recorded for `backend_id`.
    pub fn failure_count(&self, backend_id: &str) -> u32 {
        self.lock()
            .get(backend_id)
            .map(|r| r.consecutive_failures)
            .unwrap_or(0)
    }

    /// Copy of the record for `backend_id`, if one exists.
    pub fn record(&self, backend_id: &str) -> Option<HealthRecord> {
        self.lock().get(backend_id).cloned()
    }

    /// Snapshot of every tracked backend, keyed by id.
    pub fn status(&self) -> BTreeMap<String, BackendHealthSnapshot> {
        self.lock()
            .iter()
            .map(|(id, r)| {
                (
                    id.clone(),
                    BackendHealthSnapshot {
                        available: r.available,
                        consecutive_failures: r.consecutive_failures,
                        avg_response_time_ms: r.average_response_time(),
                        last_checked: r.last_checked_wall,
                    },
                )
            })
            .collect()
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}
