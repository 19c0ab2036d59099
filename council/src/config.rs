//! Router tuning knobs
//!
//! Every numeric threshold the router relies on lives here so deployments
//! can override them from a config file instead of patching code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for candidate health, classification and consensus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Consecutive failures before a backend enters cooldown
    pub max_failures: u32,
    /// Seconds a failing backend stays excluded before it may be retried
    pub cooldown_secs: u64,
    /// Number of response-time samples kept per backend
    pub response_time_window: usize,
    /// Tasks shorter than this (in characters) classify as quick tasks
    pub quick_task_max_chars: usize,
    /// Single-keyword code tasks shorter than this classify as fast code
    pub fast_code_max_chars: usize,
    /// Tasks longer than this always use consensus execution
    pub consensus_min_chars: usize,
    /// Mean absolute length deviation, as a fraction of the mean, that
    /// still counts as consistent
    pub consistency_band: f64,
    /// Participants for consensus when the caller does not say
    pub default_consensus_threshold: usize,
    /// Characters per token used for cost estimates
    pub chars_per_token: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            cooldown_secs: 10 * 60,
            response_time_window: 10,
            quick_task_max_chars: 200,
            fast_code_max_chars: 500,
            consensus_min_chars: 2000,
            consistency_band: 0.3,
            default_consensus_threshold: 2,
            chars_per_token: 4,
        }
    }
}

impl RouterConfig {
    /// Cooldown window as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Estimated cost of producing `text` at `cost_per_million` units per
    /// million tokens.
    pub fn estimate_cost(&self, text: &str, cost_per_million: f64) -> f64 {
        let chars = text.chars().count();
        let tokens = chars.div_ceil(self.chars_per_token.max(1));
        tokens as f64 / 1_000_000.0 * cost_per_million
    }
}
