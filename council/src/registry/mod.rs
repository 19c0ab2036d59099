//! Backend Registry — catalog of invocable backends
//!
//! Holds one [`BackendDescriptor`] per backend id and the specialization
//! matrix that maps each [`TaskCategory`] to ordered primary and backup
//! candidates. The registry is built once and shared read-only behind an
//! `Arc`; there is no runtime registration.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::InvokeError;
use crate::router::TaskCategory;

/// Cost class of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    /// Free or near-free workers, always tried first
    Tier0,
    /// Paid escalation path
    Tier1,
}

impl CostTier {
    /// Numeric tier level (0 or 1).
    pub fn level(&self) -> u8 {
        match self {
            Self::Tier0 => 0,
            Self::Tier1 => 1,
        }
    }
}

impl std::fmt::Display for CostTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tier0 => write!(f, "tier0"),
            Self::Tier1 => write!(f, "tier1"),
        }
    }
}

/// Per-call options handed to an invoker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeOptions {
    /// Category the task was routed under
    pub category: Option<TaskCategory>,
    /// Sampling temperature override
    pub temperature: Option<f32>,
    /// Output token cap
    pub max_tokens: Option<u32>,
    /// Why this call is happening (e.g. the tier-0 failure being escalated)
    pub context: Option<String>,
}

/// Something that can run a prompt against a backend.
///
/// Implementations own their timeouts; a timeout is reported as an
/// ordinary [`InvokeError`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendInvoker: Send + Sync {
    /// Run `prompt` on `backend_id`, returning the raw response text.
    async fn invoke(
        &self,
        backend_id: &str,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<String, InvokeError>;
}

/// Immutable description of a registered backend
#[derive(Clone)]
pub struct BackendDescriptor {
    pub id: String,
    pub specialties: BTreeSet<TaskCategory>,
    pub cost_tier: CostTier,
    /// Cost per million tokens
    pub cost_per_million: f64,
    pub invoker: Arc<dyn BackendInvoker>,
}

impl BackendDescriptor {
    /// Create a descriptor with no specialty tags.
    pub fn new(
        id: impl Into<String>,
        cost_tier: CostTier,
        cost_per_million: f64,
        invoker: Arc<dyn BackendInvoker>,
    ) -> Self {
        Self {
            id: id.into(),
            specialties: BTreeSet::new(),
            cost_tier,
            cost_per_million,
            invoker,
        }
    }

    /// Add specialty tags.
    pub fn with_specialties(mut self, tags: impl IntoIterator<Item = TaskCategory>) -> Self {
        self.specialties.extend(tags);
        self
    }
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("id", &self.id)
            .field("specialties", &self.specialties)
            .field("cost_tier", &self.cost_tier)
            .field("cost_per_million", &self.cost_per_million)
            .finish_non_exhaustive()
    }
}

/// Ordered candidates for one category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecializationEntry {
    pub primary: Vec<String>,
    #[serde(default)]
    pub backup: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl SpecializationEntry {
    pub fn new<P, B>(primary: P, backup: B, description: &str) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            primary: primary.into_iter().map(Into::into).collect(),
            backup: backup.into_iter().map(Into::into).collect(),
            description: description.to_string(),
        }
    }

    /// `primary ++ backup`, in preference order.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        self.primary
            .iter()
            .chain(self.backup.iter())
            .map(String::as_str)
    }
}

/// Default specialization matrix.
///
/// Tier-0 local models come first; paid tier-1 backends sit at the end of
/// the backup lists so they are only reachable when routing is not
/// restricted to tier 0.
pub fn default_matrix() -> BTreeMap<TaskCategory, SpecializationEntry> {
    use TaskCategory::*;
    let mut m = BTreeMap::new();
    m.insert(
        CodeGeneration,
        SpecializationEntry::new(
            ["ollama_deepseek_coder_v2", "ollama_deepseek_coder_33b"],
            [
                "ollama_qwen_coder_32b",
                "ollama_codestral",
                "ollama_deepseek",
                "deepseek",
                "chatgpt",
            ],
            "Code generation tasks",
        ),
    );
    m.insert(
        CodeReview,
        SpecializationEntry::new(
            ["ollama_deepseek_coder_v2", "ollama_deepseek_coder_33b"],
            ["ollama_codestral", "ollama_deepseek", "deepseek", "chatgpt"],
            "Code review and analysis",
        ),
    );
    m.insert(
        ComplexReasoning,
        SpecializationEntry::new(
            ["ollama_deepseek_v3", "ollama_llama_3_3_70b"],
            ["ollama_qwen_2_5_72b", "ollama_gemma_2_27b", "chatgpt", "gemini"],
            "Complex reasoning and strategic decisions",
        ),
    );
    m.insert(
        MathResearch,
        SpecializationEntry::new(
            ["ollama_deepseek_v3", "ollama_qwen_2_5_72b"],
            ["ollama_llama_3_3_70b", "ollama_gemma_2_27b", "gemini", "chatgpt"],
            "Mathematical tasks and research",
        ),
    );
    m.insert(
        QuickTasks,
        SpecializationEntry::new(
            ["ollama_llama", "ollama_phi3"],
            ["ollama_codestral", "deepseek"],
            "Quick, simple tasks",
        ),
    );
    m.insert(
        FastCode,
        SpecializationEntry::new(
            ["ollama_codestral", "ollama_phi3"],
            ["ollama_deepseek_coder_v2", "deepseek"],
            "Fast code snippets and quick code tasks",
        ),
    );
    m.insert(
        General,
        SpecializationEntry::new(
            ["ollama_llama", "ollama_gemma_2_27b"],
            ["ollama_phi3", "ollama_llama_3_3_70b", "deepseek", "gemini", "grok"],
            "General purpose tasks",
        ),
    );
    m
}

/// Read-only catalog of backends and category preferences
pub struct BackendRegistry {
    backends: HashMap<String, BackendDescriptor>,
    matrix: BTreeMap<TaskCategory, SpecializationEntry>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Look up a backend by id.
    pub fn get(&self, id: &str) -> Option<&BackendDescriptor> {
        self.backends.get(id)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.backends.contains_key(id)
    }

    /// Specialization entry for `category`, falling back to `general`.
    pub fn specialization(&self, category: TaskCategory) -> Option<&SpecializationEntry> {
        self.matrix
            .get(&category)
            .or_else(|| self.matrix.get(&TaskCategory::General))
    }

    /// Categories with a configured entry.
    pub fn categories(&self) -> Vec<TaskCategory> {
        self.matrix.keys().copied().collect()
    }

    /// Registered backend ids in `tier`, sorted.
    pub fn ids_in_tier(&self, tier: CostTier) -> Vec<String> {
        let mut ids: Vec<String> = self
            .backends
            .values()
            .filter(|b| b.cost_tier == tier)
            .map(|b| b.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Builder for [`BackendRegistry`]
#[derive(Default)]
pub struct BackendRegistryBuilder {
    backends: HashMap<String, BackendDescriptor>,
    matrix: BTreeMap<TaskCategory, SpecializationEntry>,
}

impl BackendRegistryBuilder {
    /// Register a backend. A later registration with the same id replaces
    /// the earlier one.
    pub fn backend(mut self, descriptor: BackendDescriptor) -> Self {
        if self.backends.contains_key(&descriptor.id) {
            warn!(backend = %descriptor.id, "Backend registered twice, keeping the last one");
        }
        self.backends.insert(descriptor.id.clone(), descriptor);
        self
    }

    /// Set the candidates for one category.
    pub fn specialize(mut self, category: TaskCategory, entry: SpecializationEntry) -> Self {
        self.matrix.insert(category, entry);
        self
    }

    /// Replace the whole specialization matrix.
    pub fn matrix(mut self, matrix: BTreeMap<TaskCategory, SpecializationEntry>) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn build(self) -> BackendRegistry {
        for (category, entry) in &self.matrix {
            for id in entry.candidates() {
                if !self.backends.contains_key(id) {
                    debug!(%category, backend = id, "Matrix references unregistered backend");
                }
            }
        }
        BackendRegistry {
            backends: self.backends,
            matrix: self.matrix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl BackendInvoker for Echo {
        async fn invoke(
            &self,
            backend_id: &str,
            prompt: &str,
            _options: &InvokeOptions,
        ) -> Result<String, InvokeError> {
            Ok(format!("{backend_id}:{prompt}"))
        }
    }

    #[test]
    fn test_cost_tier_levels_and_names() {
        assert_eq!(CostTier::Tier0.level(), 0);
        assert_eq!(CostTier::Tier1.level(), 1);
        assert!(CostTier::Tier0 < CostTier::Tier1);
        assert_eq!(CostTier::Tier1.to_string(), "tier1");
    }

    fn echo(id: &str, tier: CostTier) -> BackendDescriptor {
        BackendDescriptor::new(id, tier, 0.0, Arc::new(Echo))
    }

    #[test]
    fn test_default_matrix_covers_every_category() {
        let matrix = default_matrix();
        for cat in TaskCategory::all() {
            let entry = matrix.get(cat).expect("category missing");
            assert!(!entry.primary.is_empty());
        }
    }

    #[test]
    fn test_candidates_keep_primary_before_backup() {
        let entry = SpecializationEntry::new(["a", "b"], ["c"], "");
        let order: Vec<&str> = entry.candidates().collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_category_falls_back_to_general() {
        let registry = BackendRegistry::builder()
            .backend(echo("a", CostTier::Tier0))
            .specialize(
                TaskCategory::General,
                SpecializationEntry::new(["a"], Vec::<String>::new(), "general"),
            )
            .build();
        let entry = registry.specialization(TaskCategory::MathResearch).unwrap();
        assert_eq!(entry.description, "general");
    }

    #[test]
    fn test_ids_in_tier() {
        let registry = BackendRegistry::builder()
            .backend(echo("z", CostTier::Tier0))
            .backend(echo("a", CostTier::Tier0))
            .backend(echo("paid", CostTier::Tier1))
            .build();
        assert_eq!(registry.ids_in_tier(CostTier::Tier0), vec!["a", "z"]);
        assert_eq!(registry.ids_in_tier(CostTier::Tier1), vec!["paid"]);
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_descriptor_invoker_is_callable() {
        let d = echo("a", CostTier::Tier0).with_specialties([TaskCategory::General]);
        let out = d
            .invoker
            .invoke(&d.id, "hi", &InvokeOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "a:hi");
        assert!(d.specialties.contains(&TaskCategory::General));
    }

    #[test]
    fn test_entry_deserializes_without_backup() {
        let entry: SpecializationEntry = serde_json::from_str(r#"{"primary":["x"]}"#).unwrap();
        assert_eq!(entry.primary, vec!["x"]);
        assert!(entry.backup.is_empty());
    }
}
