//! Task Router Module
//!
//! Routes a task to one or more backends based on:
//! - Task category (heuristic classification or caller override)
//! - Backend health (circuit breaker with timed cooldown)
//! - External rate-limit cooldowns
//! - Complexity and length (consensus vs single execution)
//!
//! # Candidate Selection
//!
//! ```text
//! Category           | Primary                  | Backup
//! -------------------|--------------------------|----------------------------
//! code_generation    | deepseek coder v2 / 33b  | qwen coder, codestral, ...
//! code_review        | deepseek coder v2 / 33b  | codestral, deepseek, ...
//! complex_reasoning  | deepseek v3, llama 3.3   | qwen 2.5, gemma 2, ...
//! quick_tasks        | llama, phi3              | codestral, ...
//! ```
//!
//! Primaries are always attempted before backups.

pub mod cooldown;
pub mod engine;
pub mod health;
pub mod task_classifier;

pub use cooldown::ProviderCooldowns;
pub use engine::{
    Complexity, ConsensusDetail, ExecutionResult, ParticipantOutcome, RouteOptions, Router,
    RouterStatus,
};
pub use health::{BackendHealthSnapshot, HealthMonitor, HealthRecord};
pub use task_classifier::{KeywordSignals, TaskCategory, TaskClassifier};
