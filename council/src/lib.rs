//! Council Router Library
//!
//! Dispatches natural-language tasks to interchangeable LLM backends:
//! - Heuristic task classification into routing categories
//! - Per-backend health tracking with a self-healing circuit breaker
//! - Sequential fallback across a category's primary and backup backends
//! - Parallel consensus execution with response aggregation
//! - Two-tier escalation (free/local first, paid on failure) with cost stats
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use council_router::{
//!     BackendRegistry, EscalationConfig, Router, RouterConfig, TierEscalator, TierOptions,
//! };
//!
//! let registry = BackendRegistry::builder()
//!     .backend(local_llama)
//!     .backend(premium)
//!     .matrix(council_router::registry::default_matrix())
//!     .build();
//! let router = Arc::new(Router::new(Arc::new(registry), RouterConfig::default()));
//! let escalator = TierEscalator::new(router, EscalationConfig::default());
//!
//! let result = escalator.route("summarize this changelog", &TierOptions::default()).await;
//! println!("{:?} via {:?}", result.tier, result.backend_id);
//! println!("{:?}", escalator.stats());
//! ```

pub mod config;
pub mod ensemble;
pub mod error;
pub mod escalation;
pub mod observer;
pub mod registry;
pub mod router;

pub use config::RouterConfig;

pub use error::{AttemptFailure, InvokeError, RouterError};

pub use registry::{
    BackendDescriptor, BackendInvoker, BackendRegistry, CostTier, InvokeOptions,
    SpecializationEntry,
};

pub use router::{
    Complexity, ExecutionResult, HealthMonitor, ProviderCooldowns, RouteOptions, Router,
    RouterStatus, TaskCategory, TaskClassifier,
};

pub use ensemble::{ConsensusAggregator, ConsensusAnalysis, ConsensusOutcome, SuccessfulResponse};

pub use escalation::{
    EscalationConfig, RiskLevel, RoutingStats, RoutingStatsSnapshot, TierEscalator, TierOptions,
};

pub use observer::{AttemptEvent, RoutingObserver};
