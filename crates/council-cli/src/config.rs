//! Council configuration
//!
//! Loaded from TOML (`--config` or `COUNCIL_CONFIG`). Without a file the
//! default catalog is assembled from environment variables: every local
//! Ollama model of the default matrix, plus each premium provider whose
//! API key variable is set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use council_router::{CostTier, EscalationConfig, RouterConfig, SpecializationEntry, TaskCategory};
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "COUNCIL_CONFIG";

const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

/// Wire protocol spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Ollama `/api/generate`
    Ollama,
    /// OpenAI-style `/chat/completions` (OpenAI, DeepSeek, xAI, ...)
    OpenaiCompat,
    /// Google Generative Language `generateContent`
    Gemini,
}

/// One backend entry in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSpec {
    pub provider: ProviderKind,
    pub model: String,
    /// Base URL; each provider has a sensible default
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_tier")]
    pub tier: CostTier,
    #[serde(default)]
    pub cost_per_million: f64,
    #[serde(default)]
    pub specialties: Vec<TaskCategory>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tier() -> CostTier {
    CostTier::Tier0
}

fn default_timeout_secs() -> u64 {
    120
}

impl BackendSpec {
    fn ollama(endpoint: &str, model: &str) -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: model.to_string(),
            endpoint: Some(endpoint.to_string()),
            api_key_env: None,
            tier: CostTier::Tier0,
            cost_per_million: 0.0,
            specialties: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }

    fn premium(
        provider: ProviderKind,
        endpoint: &str,
        model: &str,
        key_env: &str,
        cost_per_million: f64,
    ) -> Self {
        Self {
            provider,
            model: model.to_string(),
            endpoint: Some(endpoint.to_string()),
            api_key_env: Some(key_env.to_string()),
            tier: CostTier::Tier1,
            cost_per_million,
            specialties: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

/// Top-level council configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub backends: BTreeMap<String, BackendSpec>,
    /// Category preferences; the built-in matrix when absent
    #[serde(default)]
    pub specializations: Option<BTreeMap<TaskCategory, SpecializationEntry>>,
    /// Append routing events to this JSONL file
    #[serde(default)]
    pub telemetry_path: Option<PathBuf>,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        let ollama = std::env::var("OLLAMA_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_OLLAMA_ENDPOINT.into());

        let mut backends: BTreeMap<String, BackendSpec> = [
            ("ollama_llama", "llama3.2:1b"),
            ("ollama_phi3", "phi3:mini"),
            ("ollama_deepseek", "deepseek-coder:latest"),
            ("ollama_deepseek_coder_v2", "deepseek-coder-v2:latest"),
            ("ollama_deepseek_coder_33b", "deepseek-coder:33b"),
            ("ollama_qwen_coder_32b", "qwen2.5-coder:32b-instruct"),
            ("ollama_codestral", "codestral:latest"),
            ("ollama_deepseek_v3", "deepseek-v3:latest"),
            ("ollama_llama_3_3_70b", "llama3.3:70b-instruct-q4_0"),
            ("ollama_qwen_2_5_72b", "qwen2.5:72b-q4_0"),
            ("ollama_gemma_2_27b", "gemma2:27b-it-q4_0"),
        ]
        .into_iter()
        .map(|(id, model)| (id.to_string(), BackendSpec::ollama(&ollama, model)))
        .collect();

        let premium = [
            (
                "deepseek",
                BackendSpec::premium(
                    ProviderKind::OpenaiCompat,
                    "https://api.deepseek.com/v1",
                    "deepseek-coder",
                    "DEEPSEEK_API_KEY",
                    0.1,
                ),
            ),
            (
                "chatgpt",
                BackendSpec::premium(
                    ProviderKind::OpenaiCompat,
                    "https://api.openai.com/v1",
                    "gpt-4o",
                    "OPENAI_API_KEY",
                    2.5,
                ),
            ),
            (
                "gemini",
                BackendSpec::premium(
                    ProviderKind::Gemini,
                    "https://generativelanguage.googleapis.com/v1beta",
                    "gemini-2.5-pro",
                    "GEMINI_API_KEY",
                    1.25,
                ),
            ),
            (
                "grok",
                BackendSpec::premium(
                    ProviderKind::OpenaiCompat,
                    "https://api.x.ai/v1",
                    "grok-2-1212",
                    "XAI_API_KEY",
                    5.0,
                ),
            ),
        ];
        for (id, spec) in premium {
            if spec.api_key().is_some() {
                backends.insert(id.to_string(), spec);
            }
        }

        Self {
            router: RouterConfig::default(),
            escalation: EscalationConfig::default(),
            backends,
            specializations: None,
            telemetry_path: std::env::var("COUNCIL_TELEMETRY").ok().map(PathBuf::from),
        }
    }
}

impl CouncilConfig {
    /// Parse a TOML document.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse council config")
    }

    /// Load a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Load from `path`, else `COUNCIL_CONFIG`, else the environment defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim())),
            _ => Ok(Self::default()),
        }
    }
}
