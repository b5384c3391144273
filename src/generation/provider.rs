//! Text generation providers
//!
//! One HTTP implementation covers every OpenAI-compatible chat-completions endpoint;
//! providers differ only by base URL and whether a bearer key is required.

use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Text generation is disabled (set llm.enabled = true)")]
    Disabled,

    #[error("API key missing: environment variable {0} is not set")]
    ApiKeyMissing(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Provider returned no content")]
    EmptyResponse,

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),
}

/// Sampling parameters for one generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1024,
        }
    }
}

impl From<&LlmConfig> for GenerationParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Trait for text generation backends
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a completion for a single user prompt
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// Default endpoint for a named provider
fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        _ => None,
    }
}

/// Chat-completions client for any OpenAI-compatible API
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            timeout_secs,
            client,
        })
    }

    /// Build from the `[llm]` section
    ///
    /// Base URL: `llm.base_url` > provider default. The key is read from
    /// `llm.api_key_env` and is mandatory for hosted providers.
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        if !config.enabled {
            return Err(GenerationError::Disabled);
        }

        let base_url = match config.base_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => url.to_string(),
            None => default_base_url(&config.provider)
                .ok_or_else(|| {
                    GenerationError::InvalidConfig(format!(
                        "Provider '{}' needs llm.base_url",
                        config.provider
                    ))
                })?
                .to_string(),
        };

        let api_key = std::env::var(&config.api_key_env).ok();
        let needs_key = matches!(config.provider.as_str(), "openai" | "groq");
        if needs_key && api_key.as_deref().unwrap_or("").is_empty() {
            return Err(GenerationError::ApiKeyMissing(config.api_key_env.clone()));
        }

        Self::new(
            config.provider.clone(),
            base_url,
            api_key,
            config.model.clone(),
            config.timeout_secs,
        )
    }

    fn request_body(&self, prompt: &str, params: &GenerationParams) -> Value {
        json!({
            "model": self.model,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }
}

/// Pull the first choice's message content out of a chat-completions response
///
/// The text is returned as generated; only a blank reply counts as empty.
fn extract_content(json: &Value) -> Result<String, GenerationError> {
    json["choices"]
        .get(0)
        .and_then(|choice| choice["message"]["content"].as_str())
        .filter(|content| !content.trim().is_empty())
        .map(String::from)
        .ok_or(GenerationError::EmptyResponse)
}

#[async_trait]
impl GenerationProvider for OpenAiCompatibleProvider {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, params));

        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        tracing::debug!("Sending generation request to {} ({})", self.name, self.model);

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout_secs)
            } else {
                GenerationError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout_secs)
            } else {
                GenerationError::Http(e.to_string())
            }
        })?;

        extract_content(&json)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
