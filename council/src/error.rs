//! Error types for backend invocation and routing

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::CostTier;
use crate::router::TaskCategory;

/// Errors returned by a [`BackendInvoker`](crate::registry::BackendInvoker)
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),
}

/// One failed attempt against a backend, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub backend_id: String,
    pub reason: String,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.backend_id, self.reason)
    }
}

fn join_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Routing failures surfaced to callers
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouterError {
    /// Every candidate is in cooldown, unregistered, or outside the tier
    #[error("no available backends for task category {category}")]
    NoAvailableBackend {
        category: TaskCategory,
        tier: Option<CostTier>,
    },

    /// A single backend call failed
    #[error("backend {backend_id} failed: {reason}")]
    BackendInvocationFailed { backend_id: String, reason: String },

    /// Every candidate was attempted and failed
    #[error("all backends exhausted for task category {category}: {}", join_attempts(.attempts))]
    AllCandidatesExhausted {
        category: TaskCategory,
        attempts: Vec<AttemptFailure>,
    },

    /// Every fan-out participant failed
    #[error("all consensus backends failed for task category {category}: {}", join_attempts(.attempts))]
    AllConsensusFailed {
        category: TaskCategory,
        attempts: Vec<AttemptFailure>,
    },

    /// A tier-0 answer was produced but rejected by the output check
    #[error("output from {backend_id} rejected: {reason}")]
    OutputRejected { backend_id: String, reason: String },

    /// Both tiers failed
    #[error("tier 0 and tier 1 both failed (tier 0: {tier0}; tier 1: {tier1})")]
    TierFullyExhausted {
        tier0: Box<RouterError>,
        tier1: Box<RouterError>,
    },
}

impl RouterError {
    /// Backend ids that were actually invoked before this error surfaced.
    pub fn attempted_backends(&self) -> Vec<String> {
        match self {
            Self::NoAvailableBackend { .. } => Vec::new(),
            Self::BackendInvocationFailed { backend_id, .. }
            | Self::OutputRejected { backend_id, .. } => vec![backend_id.clone()],
            Self::AllCandidatesExhausted { attempts, .. }
            | Self::AllConsensusFailed { attempts, .. } => {
                attempts.iter().map(|a| a.backend_id.clone()).collect()
            }
            Self::TierFullyExhausted { tier0, tier1 } => {
                let mut ids = tier0.attempted_backends();
                ids.extend(tier1.attempted_backends());
                ids
            }
        }
    }
}

impl From<RouterError> for AttemptFailure {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::BackendInvocationFailed { backend_id, reason } => {
                AttemptFailure { backend_id, reason }
            }
            other => AttemptFailure {
                backend_id: other.attempted_backends().join(","),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(id: &str, reason: &str) -> AttemptFailure {
        AttemptFailure {
            backend_id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_exhausted_message_names_category_and_backends() {
        let err = RouterError::AllCandidatesExhausted {
            category: TaskCategory::CodeReview,
            attempts: vec![attempt("a", "timeout"), attempt("b", "500")],
        };
        let msg = err.to_string();
        assert!(msg.contains("code_review"));
        assert!(msg.contains("a: timeout"));
        assert!(msg.contains("b: 500"));
    }

    #[test]
    fn test_tier_exhausted_keeps_both_contexts() {
        let err = RouterError::TierFullyExhausted {
            tier0: Box::new(RouterError::NoAvailableBackend {
                category: TaskCategory::General,
                tier: Some(CostTier::Tier0),
            }),
            tier1: Box::new(RouterError::AllCandidatesExhausted {
                category: TaskCategory::General,
                attempts: vec![attempt("premium", "quota")],
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("no available backends"));
        assert!(msg.contains("premium: quota"));
        assert_eq!(err.attempted_backends(), vec!["premium".to_string()]);
    }

    #[test]
    fn test_router_error_serializes_with_kind_tag() {
        let err = RouterError::AllConsensusFailed {
            category: TaskCategory::General,
            attempts: vec![attempt("x", "boom")],
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "all_consensus_failed");
        assert_eq!(json["category"], "general");
        assert_eq!(json["attempts"][0]["backend_id"], "x");
    }
}
