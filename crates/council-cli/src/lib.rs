//! Council CLI support
//!
//! Turns a [`CouncilConfig`] into a ready [`TierEscalator`]: HTTP invokers
//! per backend, the specialization matrix, and the optional JSONL
//! telemetry sink.

pub mod config;
pub mod providers;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use council_router::registry::default_matrix;
use council_router::{BackendRegistry, Router, TierEscalator};
use tracing::info;

use crate::config::CouncilConfig;
use crate::telemetry::JsonlTelemetry;

/// Registry with every configured backend and the configured (or default)
/// specialization matrix.
pub fn build_registry(config: &CouncilConfig) -> Result<BackendRegistry> {
    let mut builder = BackendRegistry::builder();
    for (id, spec) in &config.backends {
        builder = builder.backend(providers::build_descriptor(id, spec)?);
    }
    let matrix = config
        .specializations
        .clone()
        .unwrap_or_else(default_matrix);
    Ok(builder.matrix(matrix).build())
}

/// Router over [`build_registry`], with telemetry attached when configured.
pub fn build_router(config: &CouncilConfig) -> Result<Router> {
    let registry = build_registry(config)?;
    info!(backends = registry.len(), "Council registry built");

    let mut router = Router::new(Arc::new(registry), config.router.clone());
    if let Some(path) = &config.telemetry_path {
        info!(path = %path.display(), "Routing telemetry enabled");
        router = router.with_observer(Arc::new(JsonlTelemetry::new(path.clone())));
    }
    Ok(router)
}

/// Tiered front end over [`build_router`].
pub fn build_escalator(config: &CouncilConfig) -> Result<TierEscalator> {
    let router = build_router(config)?;
    Ok(TierEscalator::new(
        Arc::new(router),
        config.escalation.clone(),
    ))
}
