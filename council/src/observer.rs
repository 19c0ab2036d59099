//! Hooks for recording routing statistics outside the router.
//!
//! The router never persists anything itself. Callers that want a history
//! of attempts or results register a [`RoutingObserver`].

use serde::{Deserialize, Serialize};

use crate::registry::CostTier;
use crate::router::{ExecutionResult, TaskCategory};

/// One backend invocation, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptEvent {
    pub backend_id: String,
    pub category: TaskCategory,
    pub cost_tier: CostTier,
    pub elapsed_ms: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the call was part of a consensus fan-out
    pub consensus: bool,
}

/// Receives routing events. Both methods default to no-ops.
///
/// Called synchronously on the routing task; implementations should not
/// block for long.
pub trait RoutingObserver: Send + Sync {
    fn on_attempt(&self, _event: &AttemptEvent) {}

    fn on_result(&self, _result: &ExecutionResult) {}
}
