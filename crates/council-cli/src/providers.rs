//! HTTP backend invokers
//!
//! One [`BackendInvoker`] per wire protocol. Each owns a `reqwest::Client`
//! with the backend's timeout; HTTP 429 maps to
//! [`InvokeError::RateLimited`] so the router can cool the provider down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use council_router::{BackendDescriptor, BackendInvoker, InvokeError, InvokeOptions};
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{BackendSpec, ProviderKind};

const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TEMPERATURE: f32 = 0.7;

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Map a transport error, distinguishing timeouts.
fn send_error(err: reqwest::Error, timeout: Duration) -> InvokeError {
    if err.is_timeout() {
        InvokeError::Timeout(timeout)
    } else {
        InvokeError::Request(err.to_string())
    }
}

/// Seconds from a `Retry-After` header. HTTP-date values are not supported.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Pass successful responses through; turn everything else into an error.
async fn check_status(response: Response) -> Result<Response, InvokeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(InvokeError::RateLimited { retry_after });
    }
    let body = response.text().await.unwrap_or_default();
    Err(InvokeError::Provider(format!("HTTP {}: {}", status, body)))
}

async fn read_json(response: Response) -> Result<Value, InvokeError> {
    let response = check_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| InvokeError::Malformed(e.to_string()))
}

/// Non-empty text at `pointer`, or the provider's own error message.
fn extract_text(body: &Value, pointer: &str) -> Result<String, InvokeError> {
    if let Some(message) = body.pointer("/error/message").and_then(Value::as_str) {
        return Err(InvokeError::Provider(message.to_string()));
    }
    match body.pointer(pointer).and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        Some(_) => Err(InvokeError::Malformed("empty response".to_string())),
        None => Err(InvokeError::Malformed(format!("missing {}", pointer))),
    }
}

/// Prompt with the routing context (e.g. an escalation reason) prepended.
pub fn compose_prompt(prompt: &str, options: &InvokeOptions) -> String {
    match options.context.as_deref() {
        Some(context) if !context.is_empty() => format!("Context: {}\n\n{}", context, prompt),
        _ => prompt.to_string(),
    }
}

/// Local Ollama model via `/api/generate`
pub struct OllamaInvoker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaInvoker {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl BackendInvoker for OllamaInvoker {
    async fn invoke(
        &self,
        backend_id: &str,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<String, InvokeError> {
        debug!(backend = %backend_id, model = %self.model, "Calling Ollama");
        let body = json!({
            "model": self.model,
            "prompt": compose_prompt(prompt, options),
            "stream": false,
            "options": {
                "num_predict": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            }
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        extract_text(&read_json(response).await?, "/response")
    }
}

/// OpenAI-style `/chat/completions` (OpenAI, DeepSeek, xAI)
pub struct OpenAiCompatInvoker {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiCompatInvoker {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl BackendInvoker for OpenAiCompatInvoker {
    async fn invoke(
        &self,
        backend_id: &str,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<String, InvokeError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(InvokeError::NotConfigured(format!(
                "{} has no API key",
                backend_id
            )));
        };
        debug!(backend = %backend_id, model = %self.model, "Calling chat completions");

        let mut messages = Vec::new();
        if let Some(context) = options.context.as_deref() {
            messages.push(json!({ "role": "system", "content": context }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        extract_text(&read_json(response).await?, "/choices/0/message/content")
    }
}

/// Google Gemini via `models/{model}:generateContent`
pub struct GeminiInvoker {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl GeminiInvoker {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl BackendInvoker for GeminiInvoker {
    async fn invoke(
        &self,
        backend_id: &str,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<String, InvokeError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(InvokeError::NotConfigured(format!(
                "{} has no API key",
                backend_id
            )));
        };
        debug!(backend = %backend_id, model = %self.model, "Calling Gemini");

        let body = json!({
            "contents": [{
                "parts": [{ "text": compose_prompt(prompt, options) }]
            }],
            "generationConfig": {
                "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                "maxOutputTokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            }
        });

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout))?;

        extract_text(
            &read_json(response).await?,
            "/candidates/0/content/parts/0/text",
        )
    }
}

fn default_endpoint(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::Ollama => "http://localhost:11434",
        ProviderKind::OpenaiCompat => "https://api.openai.com/v1",
        ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
    }
}

/// Build the invoker for a config entry.
pub fn build_invoker(spec: &BackendSpec) -> Result<Arc<dyn BackendInvoker>> {
    let endpoint = spec
        .endpoint
        .as_deref()
        .unwrap_or_else(|| default_endpoint(spec.provider));
    let timeout = Duration::from_secs(spec.timeout_secs);

    let invoker: Arc<dyn BackendInvoker> = match spec.provider {
        ProviderKind::Ollama => Arc::new(OllamaInvoker::new(endpoint, &spec.model, timeout)?),
        ProviderKind::OpenaiCompat => Arc::new(OpenAiCompatInvoker::new(
            endpoint,
            &spec.model,
            spec.api_key(),
            timeout,
        )?),
        ProviderKind::Gemini => Arc::new(GeminiInvoker::new(
            endpoint,
            &spec.model,
            spec.api_key(),
            timeout,
        )?),
    };
    Ok(invoker)
}

/// Descriptor for a config entry, invoker included.
pub fn build_descriptor(id: &str, spec: &BackendSpec) -> Result<BackendDescriptor> {
    let invoker =
        build_invoker(spec).with_context(|| format!("Failed to build backend {}", id))?;
    Ok(
        BackendDescriptor::new(id, spec.tier, spec.cost_per_million, invoker)
            .with_specialties(spec.specialties.iter().copied()),
    )
}
