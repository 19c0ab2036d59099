//! Router — single and consensus execution over a category's candidates
//!
//! ```text
//! route_task(text, options)
//!   ├─ classify (unless options.category is set)
//!   ├─ candidates = primary ++ backup, filtered by registry, tier,
//!   │                health cooldown and external cooldowns
//!   ├─ consensus?  ── no ──▶ execute_single: try in order, first success wins
//!   └─────────────── yes ─▶ execute_with_consensus: dispatch all, await all,
//!                            aggregate successes
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::ensemble::{ConsensusAggregator, ConsensusAnalysis, SuccessfulResponse};
use crate::error::{AttemptFailure, InvokeError, RouterError};
use crate::observer::{AttemptEvent, RoutingObserver};
use crate::registry::{BackendDescriptor, BackendRegistry, CostTier, InvokeOptions};
use crate::router::cooldown::ProviderCooldowns;
use crate::router::health::{BackendHealthSnapshot, HealthMonitor};
use crate::router::task_classifier::{TaskCategory, TaskClassifier};

/// Caller's complexity hint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
    Critical,
}

impl Complexity {
    /// Complex and critical tasks always go to consensus.
    pub fn demands_consensus(&self) -> bool {
        matches!(self, Self::Complex | Self::Critical)
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Medium => write!(f, "medium"),
            Self::Complex => write!(f, "complex"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Self::Simple),
            "medium" => Ok(Self::Medium),
            "complex" => Ok(Self::Complex),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown complexity: {}", other)),
        }
    }
}

/// Options for a single routing call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    /// Skip classification and route under this category
    pub category: Option<TaskCategory>,
    pub require_consensus: bool,
    /// Minimum consensus participants (at least 2 are always used)
    pub consensus_threshold: Option<usize>,
    pub complexity: Complexity,
    /// Forwarded to invokers, e.g. the reason for an escalation
    pub context: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl RouteOptions {
    fn invoke_options(&self, category: TaskCategory) -> InvokeOptions {
        InvokeOptions {
            category: Some(category),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            context: self.context.clone(),
        }
    }
}

/// Outcome of one consensus participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantOutcome {
    pub backend_id: String,
    pub success: bool,
    pub elapsed_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the consensus path learned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDetail {
    pub participants: Vec<ParticipantOutcome>,
    /// Present only when two or more participants succeeded
    pub analysis: Option<ConsensusAnalysis>,
}

/// Result of a routing call. Created once and never mutated by the router
/// after it is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub response: Option<String>,
    pub backend_id: Option<String>,
    pub task_category: TaskCategory,
    pub elapsed_ms: u64,
    /// Tier of the answering backend. Failures report the tier the call
    /// was restricted to, or tier 0.
    pub tier: CostTier,
    /// Estimated cost of all responses produced for this result
    pub cost: f64,
    pub consensus: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_detail: Option<ConsensusDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RouterError>,
}

impl ExecutionResult {
    /// A failed result carrying `error`.
    pub fn failed(
        category: TaskCategory,
        tier: CostTier,
        elapsed_ms: u64,
        error: RouterError,
    ) -> Self {
        Self {
            success: false,
            response: None,
            backend_id: None,
            task_category: category,
            elapsed_ms,
            tier,
            cost: 0.0,
            consensus: false,
            consensus_detail: None,
            error: Some(error),
        }
    }
}

/// A failed backend call and how long it took
struct FailedInvocation {
    error: RouterError,
    elapsed_ms: f64,
}

/// Snapshot returned by [`Router::status`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterStatus {
    pub health: BTreeMap<String, BackendHealthSnapshot>,
    pub specializations: Vec<TaskCategory>,
    /// Tier-0 backends that could be selected right now
    pub available_tier0: Vec<String>,
}

/// Routes tasks across a [`BackendRegistry`]
pub struct Router {
    registry: Arc<BackendRegistry>,
    health: Arc<HealthMonitor>,
    cooldowns: Arc<ProviderCooldowns>,
    classifier: TaskClassifier,
    aggregator: ConsensusAggregator,
    observers: Vec<Arc<dyn RoutingObserver>>,
    config: RouterConfig,
}

impl Router {
    /// Router with its own health monitor and cooldown map.
    pub fn new(registry: Arc<BackendRegistry>, config: RouterConfig) -> Self {
        Self {
            health: Arc::new(HealthMonitor::from_config(&config)),
            cooldowns: Arc::new(ProviderCooldowns::new()),
            classifier: TaskClassifier::from_config(&config),
            aggregator: ConsensusAggregator::from_config(&config),
            observers: Vec::new(),
            registry,
            config,
        }
    }

    /// Share a health monitor with other routers.
    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = health;
        self
    }

    /// Share an external cooldown map (e.g. one fed by provider rate limits).
    pub fn with_cooldowns(mut self, cooldowns: Arc<ProviderCooldowns>) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RoutingObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn cooldowns(&self) -> &Arc<ProviderCooldowns> {
        &self.cooldowns
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Category for `text`, honoring an explicit override.
    pub fn resolve_category(&self, text: &str, explicit: Option<TaskCategory>) -> TaskCategory {
        self.classifier.resolve(text, explicit)
    }

    /// Whether `text` with `options` runs through consensus execution.
    pub fn needs_consensus(&self, text: &str, options: &RouteOptions) -> bool {
        options.require_consensus
            || options.complexity.demands_consensus()
            || text.chars().count() > self.config.consensus_min_chars
    }

    /// Route a task across all tiers. Never fails: errors come back as a
    /// result with `success == false`.
    pub async fn route_task(&self, text: &str, options: &RouteOptions) -> ExecutionResult {
        let start = Instant::now();
        let category = self.resolve_category(text, options.category);
        let result = match self.dispatch(text, options, None).await {
            Ok(result) => result,
            Err(err) => ExecutionResult::failed(
                category,
                CostTier::Tier0,
                start.elapsed().as_millis() as u64,
                err,
            ),
        };
        self.notify_result(&result);
        result
    }

    /// Route a task, optionally restricted to one cost tier.
    pub async fn dispatch(
        &self,
        text: &str,
        options: &RouteOptions,
        tier: Option<CostTier>,
    ) -> Result<ExecutionResult, RouterError> {
        let category = self.resolve_category(text, options.category);
        let consensus = self.needs_consensus(text, options);

        info!(
            %category,
            consensus,
            complexity = %options.complexity,
            tier = ?tier,
            "Routing task"
        );

        if consensus {
            self.execute_with_consensus(text, category, tier, options)
                .await
        } else {
            self.execute_single(text, category, tier, options).await
        }
    }

    /// Selectable backends for `category`, in preference order.
    pub fn available_candidates(
        &self,
        category: TaskCategory,
        tier: Option<CostTier>,
    ) -> Vec<&BackendDescriptor> {
        let Some(entry) = self.registry.specialization(category) else {
            return Vec::new();
        };

        let mut seen = std::collections::HashSet::new();
        entry
            .candidates()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.registry.get(id))
            .filter(|b| tier.map_or(true, |t| b.cost_tier == t))
            .filter(|b| !self.cooldowns.is_cooling_down(&b.id))
            .filter(|b| self.health.is_available(&b.id))
            .collect()
    }

    /// Try candidates one at a time; the first success is returned.
    pub async fn execute_single(
        &self,
        text: &str,
        category: TaskCategory,
        tier: Option<CostTier>,
        options: &RouteOptions,
    ) -> Result<ExecutionResult, RouterError> {
        let candidates = self.available_candidates(category, tier);
        if candidates.is_empty() {
            warn!(%category, tier = ?tier, "No available backends");
            return Err(RouterError::NoAvailableBackend { category, tier });
        }

        let invoke_options = options.invoke_options(category);
        let mut attempts: Vec<AttemptFailure> = Vec::new();

        for backend in candidates {
            match self
                .invoke_backend(backend, text, &invoke_options, category, false)
                .await
            {
                Ok(success) => {
                    let cost = self
                        .config
                        .estimate_cost(&success.response, backend.cost_per_million);
                    return Ok(ExecutionResult {
                        success: true,
                        response: Some(success.response),
                        backend_id: Some(success.backend_id),
                        task_category: category,
                        elapsed_ms: success.elapsed_ms as u64,
                        tier: backend.cost_tier,
                        cost,
                        consensus: false,
                        consensus_detail: None,
                        error: None,
                    });
                }
                Err(failed) => attempts.push(failed.error.into()),
            }
        }

        Err(RouterError::AllCandidatesExhausted { category, attempts })
    }

    /// Fan out to the first `max(threshold, 2)` candidates concurrently and
    /// reconcile the answers.
    pub async fn execute_with_consensus(
        &self,
        text: &str,
        category: TaskCategory,
        tier: Option<CostTier>,
        options: &RouteOptions,
    ) -> Result<ExecutionResult, RouterError> {
        let candidates = self.available_candidates(category, tier);
        if candidates.is_empty() {
            warn!(%category, tier = ?tier, "No available backends for consensus");
            return Err(RouterError::NoAvailableBackend { category, tier });
        }

        let threshold = options
            .consensus_threshold
            .unwrap_or(self.config.default_consensus_threshold)
            .max(2);
        let participants: Vec<&BackendDescriptor> =
            candidates.into_iter().take(threshold).collect();

        info!(
            %category,
            participants = ?participants.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            "Executing consensus"
        );

        let invoke_options = options.invoke_options(category);
        let start = Instant::now();
        // join_all polls every call once before waiting on any of them.
        let outcomes = join_all(
            participants
                .iter()
                .map(|b| self.invoke_backend(b, text, &invoke_options, category, true)),
        )
        .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let mut successes: Vec<(SuccessfulResponse, &BackendDescriptor)> = Vec::new();
        let mut attempts: Vec<AttemptFailure> = Vec::new();
        let mut detail: Vec<ParticipantOutcome> = Vec::new();

        for (backend, outcome) in participants.iter().zip(outcomes) {
            match outcome {
                Ok(success) => {
                    detail.push(ParticipantOutcome {
                        backend_id: backend.id.clone(),
                        success: true,
                        elapsed_ms: success.elapsed_ms,
                        error: None,
                    });
                    successes.push((success, *backend));
                }
                Err(failed) => {
                    let failure: AttemptFailure = failed.error.into();
                    detail.push(ParticipantOutcome {
                        backend_id: backend.id.clone(),
                        success: false,
                        elapsed_ms: failed.elapsed_ms,
                        error: Some(failure.reason.clone()),
                    });
                    attempts.push(failure);
                }
            }
        }

        if successes.is_empty() {
            return Err(RouterError::AllConsensusFailed { category, attempts });
        }

        let cost: f64 = successes
            .iter()
            .map(|(s, b)| self.config.estimate_cost(&s.response, b.cost_per_million))
            .sum();

        if successes.len() == 1 {
            let (success, backend) = successes.remove(0);
            debug!(backend = %backend.id, "Only one consensus participant succeeded");
            return Ok(ExecutionResult {
                success: true,
                response: Some(success.response),
                backend_id: Some(success.backend_id),
                task_category: category,
                elapsed_ms,
                tier: backend.cost_tier,
                cost,
                consensus: false,
                consensus_detail: Some(ConsensusDetail {
                    participants: detail,
                    analysis: None,
                }),
                error: None,
            });
        }

        let responses: Vec<SuccessfulResponse> =
            successes.iter().map(|(s, _)| s.clone()).collect();
        let Some(outcome) = self.aggregator.aggregate(&responses) else {
            return Err(RouterError::AllConsensusFailed { category, attempts });
        };
        let tier_of_winner = successes
            .iter()
            .find(|(_, b)| b.id == outcome.winning_backend)
            .map(|(_, b)| b.cost_tier)
            .unwrap_or(CostTier::Tier0);

        Ok(ExecutionResult {
            success: true,
            response: Some(outcome.final_response),
            backend_id: Some(outcome.winning_backend),
            task_category: category,
            elapsed_ms,
            tier: tier_of_winner,
            cost,
            consensus: true,
            consensus_detail: Some(ConsensusDetail {
                participants: detail,
                analysis: Some(outcome.analysis),
            }),
            error: None,
        })
    }

    /// Call one backend and book the outcome into health, cooldowns and
    /// observers.
    async fn invoke_backend(
        &self,
        backend: &BackendDescriptor,
        prompt: &str,
        options: &InvokeOptions,
        category: TaskCategory,
        consensus: bool,
    ) -> Result<SuccessfulResponse, FailedInvocation> {
        let start = Instant::now();
        let outcome = backend.invoker.invoke(&backend.id, prompt, options).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut event = AttemptEvent {
            backend_id: backend.id.clone(),
            category,
            cost_tier: backend.cost_tier,
            elapsed_ms,
            success: outcome.is_ok(),
            error: None,
            consensus,
        };

        let result = match outcome {
            Ok(response) => {
                self.health.record_success(&backend.id, elapsed_ms);
                debug!(backend = %backend.id, elapsed_ms, "Backend succeeded");
                Ok(SuccessfulResponse {
                    backend_id: backend.id.clone(),
                    response,
                    elapsed_ms,
                })
            }
            Err(err) => {
                warn!(backend = %backend.id, error = %err, "Backend failed");
                self.health.record_failure(&backend.id);
                if let InvokeError::RateLimited {
                    retry_after: Some(retry_after),
                } = &err
                {
                    self.cooldowns.impose(&backend.id, *retry_after);
                }
                event.error = Some(err.to_string());
                Err(FailedInvocation {
                    error: RouterError::BackendInvocationFailed {
                        backend_id: backend.id.clone(),
                        reason: err.to_string(),
                    },
                    elapsed_ms,
                })
            }
        };

        for observer in &self.observers {
            observer.on_attempt(&event);
        }
        result
    }

    /// Hand a final result to every observer.
    pub fn notify_result(&self, result: &ExecutionResult) {
        for observer in &self.observers {
            observer.on_result(result);
        }
    }

    /// Health, categories and currently selectable tier-0 backends.
    pub fn status(&self) -> RouterStatus {
        let available_tier0 = self
            .registry
            .ids_in_tier(CostTier::Tier0)
            .into_iter()
            .filter(|id| !self.cooldowns.is_cooling_down(id) && self.health.is_available(id))
            .collect();
        RouterStatus {
            health: self.health.status(),
            specializations: self.registry.categories(),
            available_tier0,
        }
    }
}
