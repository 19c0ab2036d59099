//! Shared fixtures for the routing integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use council_router::{
    AttemptEvent, BackendDescriptor, BackendInvoker, BackendRegistry, CostTier, ExecutionResult,
    InvokeError, InvokeOptions, RoutingObserver, SpecializationEntry, TaskCategory,
};

/// Install a test-writer subscriber once; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// What a scripted backend does when invoked
#[derive(Clone)]
pub enum Script {
    Reply { text: String, delay: Duration },
    Fail(InvokeError),
    FailAfter { error: InvokeError, delay: Duration },
}

pub fn reply(text: &str, delay_ms: u64) -> Script {
    Script::Reply {
        text: text.to_string(),
        delay: Duration::from_millis(delay_ms),
    }
}

pub fn fail(reason: &str) -> Script {
    Script::Fail(InvokeError::Request(reason.to_string()))
}

pub fn fail_after(reason: &str, delay_ms: u64) -> Script {
    Script::FailAfter {
        error: InvokeError::Request(reason.to_string()),
        delay: Duration::from_millis(delay_ms),
    }
}

/// Invoker that answers per backend id from a fixed script and records
/// every call it receives.
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, InvokeOptions)>>,
}

impl ScriptedInvoker {
    pub fn new(scripts: Vec<(&str, Script)>) -> Arc<Self> {
        init_tracing();
        Arc::new(Self {
            scripts: scripts
                .into_iter()
                .map(|(id, s)| (id.to_string(), s))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn options_for(&self, backend_id: &str) -> Option<InvokeOptions> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == backend_id)
            .map(|(_, o)| o.clone())
    }
}

#[async_trait]
impl BackendInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        backend_id: &str,
        _prompt: &str,
        options: &InvokeOptions,
    ) -> Result<String, InvokeError> {
        self.calls
            .lock()
            .unwrap()
            .push((backend_id.to_string(), options.clone()));
        match self.scripts.get(backend_id) {
            Some(Script::Reply { text, delay }) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
            Some(Script::Fail(err)) => Err(err.clone()),
            Some(Script::FailAfter { error, delay }) => {
                tokio::time::sleep(*delay).await;
                Err(error.clone())
            }
            None => Err(InvokeError::NotConfigured(backend_id.to_string())),
        }
    }
}

/// Registry with every backend sharing one invoker and every category
/// using the same candidate list.
pub fn registry(
    invoker: &Arc<ScriptedInvoker>,
    backends: &[(&str, CostTier, f64)],
    primary: &[&str],
    backup: &[&str],
) -> BackendRegistry {
    let mut builder = BackendRegistry::builder();
    for (id, tier, cost) in backends {
        builder = builder.backend(BackendDescriptor::new(
            *id,
            *tier,
            *cost,
            invoker.clone() as Arc<dyn BackendInvoker>,
        ));
    }
    for category in TaskCategory::all() {
        builder = builder.specialize(
            *category,
            SpecializationEntry::new(primary.to_vec(), backup.to_vec(), "test"),
        );
    }
    builder.build()
}

/// Observer collecting everything it is told
#[derive(Default)]
pub struct RecordingObserver {
    pub attempts: Mutex<Vec<AttemptEvent>>,
    pub results: Mutex<Vec<ExecutionResult>>,
}

impl RoutingObserver for RecordingObserver {
    fn on_attempt(&self, event: &AttemptEvent) {
        self.attempts.lock().unwrap().push(event.clone());
    }

    fn on_result(&self, result: &ExecutionResult) {
        self.results.lock().unwrap().push(result.clone());
    }
}
