//! Tier escalation and routing statistics
//!
//! The escalator wraps the [`Router`](crate::router::Router): tier-0
//! (free/local) backends are always tried first, and tier-1 (paid)
//! backends only when tier 0 is exhausted.

pub mod engine;
pub mod stats;

pub use engine::{EscalationConfig, RiskLevel, TierEscalator, TierOptions};
pub use stats::{CostSavings, RoutingStats, RoutingStatsSnapshot, Tier0Stats, Tier1Stats};
