//! Generative chat-model abstraction used by the document processor for
//! summaries, keywords, and category suggestions.
//!
//! Unlike the embedding provider there is no retry ladder here: every
//! caller treats a failed completion as a degraded (absent) enrichment,
//! so failing fast keeps ingestion latency bounded.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EnrichmentConfig;

/// A text-generation backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Run a single system+user completion and return the assistant text.
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String>;
}

/// A no-op chat model that always returns errors.
///
/// Used when `enrichment.provider = "disabled"`; enrichment steps then
/// degrade to absent fields.
pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _system: &str, _user: &str, _temperature: f32) -> Result<String> {
        bail!("Chat model is disabled")
    }
}

/// Chat model using the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiChat {
    model: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": temperature,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message content"))?;

        Ok(content.trim().to_string())
    }
}

/// Create the configured [`ChatModel`].
pub fn create_chat(config: &EnrichmentConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        other => bail!("Unknown enrichment provider: {}", other),
    }
}
