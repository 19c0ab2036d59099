//! Tier Escalator — cheap backends first, paid backends only on failure
//!
//! Per call:
//!
//! ```text
//! START → TIER0_ATTEMPT ─┬─ ok ──▶ TIER0_SUCCESS
//!                        └─ err ─▶ TIER0_FAILED ─┬─ max_tier == 0 ─▶ return tier-0 error
//!                                                └─ TIER1_ATTEMPT ─┬─ ok ──▶ TIER1_SUCCESS
//!                                                                  └─ err ─▶ TIER1_FAILED
//! ```
//!
//! There is no retry within a tier beyond the router's own candidate list,
//! and the escalator never loops back to tier 0.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::RouterError;
use crate::escalation::stats::{RoutingStats, RoutingStatsSnapshot};
use crate::registry::CostTier;
use crate::router::{Complexity, ExecutionResult, RouteOptions, Router, TaskCategory};

/// Caller-declared risk of acting on the answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

/// Options for [`TierEscalator::route`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierOptions {
    /// Explicit category; skips classification
    pub task_type: Option<TaskCategory>,
    /// High risk forces consensus when escalating to tier 1
    pub risk_level: RiskLevel,
    /// Highest tier that may be used (defaults to the config value)
    pub max_tier: Option<u8>,
    pub require_consensus: bool,
    pub complexity: Complexity,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Configuration for the escalator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Default highest tier
    pub max_tier: u8,
    /// Per-million-token price used to value a tier-0 success
    pub premium_reference_cost_per_million: f64,
    /// Reject implausible tier-0 output and escalate instead
    pub check_tier0_output: bool,
    /// Shortest acceptable tier-0 output, in characters
    pub min_output_chars: usize,
    /// Minimum fraction of the task's significant words the output must echo
    pub min_keyword_overlap: f64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_tier: 1,
            premium_reference_cost_per_million: 2.5,
            check_tier0_output: false,
            min_output_chars: 10,
            min_keyword_overlap: 0.3,
        }
    }
}

impl EscalationConfig {
    /// Plausibility check for tier-0 output. Returns the rejection reason.
    pub fn check_output(&self, task: &str, output: &str) -> Result<(), String> {
        if output.chars().count() < self.min_output_chars {
            return Err("output too short".to_string());
        }
        if output.contains("ERROR") || output.contains("FAILED") {
            return Err("output reports an error".to_string());
        }

        let task_lower = task.to_lowercase();
        let words: Vec<&str> = task_lower
            .split_whitespace()
            .filter(|w| w.chars().count() > 4)
            .collect();
        if words.is_empty() {
            return Ok(());
        }
        let output_lower = output.to_lowercase();
        let hits = words.iter().filter(|w| output_lower.contains(*w)).count();
        let overlap = hits as f64 / words.len() as f64;
        if overlap < self.min_keyword_overlap {
            return Err(format!(
                "output does not address the task ({:.0}% overlap)",
                overlap * 100.0
            ));
        }
        Ok(())
    }
}

/// Two-tier router with cost accounting
pub struct TierEscalator {
    router: Arc<Router>,
    stats: Arc<RoutingStats>,
    config: EscalationConfig,
}

impl TierEscalator {
    pub fn new(router: Arc<Router>, config: EscalationConfig) -> Self {
        Self {
            router,
            stats: Arc::new(RoutingStats::new()),
            config,
        }
    }

    /// Share counters with other escalators.
    pub fn with_stats(mut self, stats: Arc<RoutingStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Read-only snapshot of the routing counters.
    pub fn stats(&self) -> RoutingStatsSnapshot {
        self.stats.snapshot()
    }

    /// Route a task, escalating to tier 1 only if tier 0 fails.
    pub async fn route(&self, text: &str, options: &TierOptions) -> ExecutionResult {
        let start = Instant::now();
        let category = self.router.resolve_category(text, options.task_type);
        let max_tier = options.max_tier.unwrap_or(self.config.max_tier);

        let base = RouteOptions {
            category: Some(category),
            require_consensus: options.require_consensus,
            consensus_threshold: None,
            complexity: options.complexity,
            context: None,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        self.stats.record_tier0_attempt();
        let tier0 = match self.router.dispatch(text, &base, Some(CostTier::Tier0)).await {
            Ok(result) => self.accept_tier0(text, result),
            Err(err) => Err(err),
        };

        let tier0_err = match tier0 {
            Ok(mut result) => {
                let savings = result
                    .response
                    .as_deref()
                    .map(|r| {
                        self.router
                            .config()
                            .estimate_cost(r, self.config.premium_reference_cost_per_million)
                    })
                    .unwrap_or(0.0);
                self.stats.record_tier0_success(savings);
                result.tier = CostTier::Tier0;
                result.cost = 0.0;
                info!(
                    %category,
                    backend = result.backend_id.as_deref().unwrap_or("-"),
                    savings,
                    "Tier 0 succeeded"
                );
                self.router.notify_result(&result);
                return result;
            }
            Err(err) => err,
        };

        if max_tier < CostTier::Tier1.level() {
            warn!(%category, error = %tier0_err, "Tier 0 failed, escalation disabled");
            let result = ExecutionResult::failed(
                category,
                CostTier::Tier0,
                start.elapsed().as_millis() as u64,
                tier0_err,
            );
            self.router.notify_result(&result);
            return result;
        }

        self.stats.record_tier1_fallback();
        warn!(%category, error = %tier0_err, "Tier 0 failed, escalating to tier 1");

        let tier1_options = RouteOptions {
            require_consensus: base.require_consensus || options.risk_level == RiskLevel::High,
            context: Some(format!("tier 0 failed: {}", tier0_err)),
            ..base
        };

        let result = match self
            .router
            .dispatch(text, &tier1_options, Some(CostTier::Tier1))
            .await
        {
            Ok(mut result) => {
                result.tier = CostTier::Tier1;
                info!(
                    %category,
                    backend = result.backend_id.as_deref().unwrap_or("-"),
                    cost = result.cost,
                    "Tier 1 succeeded"
                );
                result
            }
            Err(tier1_err) => {
                warn!(%category, error = %tier1_err, "Tier 1 failed");
                ExecutionResult::failed(
                    category,
                    CostTier::Tier1,
                    start.elapsed().as_millis() as u64,
                    RouterError::TierFullyExhausted {
                        tier0: Box::new(tier0_err),
                        tier1: Box::new(tier1_err),
                    },
                )
            }
        };
        self.router.notify_result(&result);
        result
    }

    fn accept_tier0(
        &self,
        text: &str,
        result: ExecutionResult,
    ) -> Result<ExecutionResult, RouterError> {
        if !self.config.check_tier0_output {
            return Ok(result);
        }
        let output = result.response.as_deref().unwrap_or_default();
        match self.config.check_output(text, output) {
            Ok(()) => Ok(result),
            Err(reason) => Err(RouterError::OutputRejected {
                backend_id: result.backend_id.clone().unwrap_or_default(),
                reason,
            }),
        }
    }
}
