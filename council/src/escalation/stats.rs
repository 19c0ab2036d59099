//! Process-wide routing counters
//!
//! Lock-free accumulators shared between concurrent routing calls. The
//! cost-savings total is an `f64` stored as bits in an `AtomicU64`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters mutated by the [`TierEscalator`](super::TierEscalator)
#[derive(Debug, Default)]
pub struct RoutingStats {
    tier0_attempts: AtomicU64,
    tier0_successes: AtomicU64,
    tier1_fallbacks: AtomicU64,
    cost_savings_bits: AtomicU64,
}

/// Tier-0 section of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier0Stats {
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
}

/// Tier-1 section of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier1Stats {
    pub fallbacks: u64,
    pub fallback_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSavings {
    pub total: f64,
    pub average_per_request: f64,
}

/// Read-only view of [`RoutingStats`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingStatsSnapshot {
    pub tier0: Tier0Stats,
    pub tier1: Tier1Stats,
    pub cost_savings: CostSavings,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl RoutingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tier0_attempt(&self) {
        self.tier0_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a tier-0 success and bank the estimated premium cost avoided.
    pub fn record_tier0_success(&self, savings: f64) {
        self.tier0_successes.fetch_add(1, Ordering::Relaxed);
        if savings > 0.0 {
            let _ = self
                .cost_savings_bits
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                    Some((f64::from_bits(bits) + savings).to_bits())
                });
        }
    }

    pub fn record_tier1_fallback(&self) {
        self.tier1_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tier0_attempts(&self) -> u64 {
        self.tier0_attempts.load(Ordering::Relaxed)
    }

    pub fn tier0_successes(&self) -> u64 {
        self.tier0_successes.load(Ordering::Relaxed)
    }

    pub fn tier1_fallbacks(&self) -> u64 {
        self.tier1_fallbacks.load(Ordering::Relaxed)
    }

    pub fn total_cost_savings(&self) -> f64 {
        f64::from_bits(self.cost_savings_bits.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> RoutingStatsSnapshot {
        let attempts = self.tier0_attempts();
        let successes = self.tier0_successes();
        let fallbacks = self.tier1_fallbacks();
        let total = self.total_cost_savings();
        RoutingStatsSnapshot {
            tier0: Tier0Stats {
                attempts,
                successes,
                success_rate: ratio(successes, attempts),
            },
            tier1: Tier1Stats {
                fallbacks,
                fallback_rate: ratio(fallbacks, attempts),
            },
            cost_savings: CostSavings {
                total,
                average_per_request: if attempts == 0 {
                    0.0
                } else {
                    total / attempts as f64
                },
            },
        }
    }
}
