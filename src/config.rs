use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"` or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Upper bound on characters per input text; longer texts are cut at
    /// this boundary before being sent to the provider.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Whole-document embedding strategy: `"truncate"` or `"chunk-mean"`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            max_input_chars: default_max_input_chars(),
            strategy: default_strategy(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_strategy() -> String {
    "truncate".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"disabled"` or `"rest"`. When disabled, every search uses the
    /// relational fallback directly.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the bearer token for the REST index.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_index_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            url: None,
            token_env: default_token_env(),
            timeout_secs: default_index_timeout_secs(),
        }
    }
}

impl IndexConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_token_env() -> String {
    "VECTOR_INDEX_TOKEN".to_string()
}
fn default_index_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    /// Candidate over-fetch multiplier for the index query, absorbing
    /// post-filtering losses.
    #[serde(default = "default_overfetch")]
    pub overfetch_factor: usize,
    /// Defaults for [`get_rag_context`](crate::rag::RagService::get_rag_context).
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
    #[serde(default = "default_context_threshold")]
    pub context_threshold: f64,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_threshold: default_threshold(),
            overfetch_factor: default_overfetch(),
            context_limit: default_context_limit(),
            context_threshold: default_context_threshold(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    50
}
fn default_threshold() -> f64 {
    0.7
}
fn default_overfetch() -> usize {
    3
}
fn default_context_limit() -> usize {
    5
}
fn default_context_threshold() -> f64 {
    0.6
}
fn default_snippet_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    /// `"disabled"` or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Near-deterministic by default for consistent summaries/keywords.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_summary_input_chars")]
    pub summary_input_chars: usize,
    #[serde(default = "default_keyword_input_chars")]
    pub keyword_input_chars: usize,
    #[serde(default = "default_classify_input_chars")]
    pub classify_input_chars: usize,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: default_chat_model(),
            temperature: default_temperature(),
            summary_input_chars: default_summary_input_chars(),
            keyword_input_chars: default_keyword_input_chars(),
            classify_input_chars: default_classify_input_chars(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

impl EnrichmentConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_summary_input_chars() -> usize {
    6000
}
fn default_keyword_input_chars() -> usize {
    4000
}
fn default_classify_input_chars() -> usize {
    3000
}
fn default_chat_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    if config.retrieval.max_limit < config.retrieval.default_limit {
        anyhow::bail!("retrieval.max_limit must be >= retrieval.default_limit");
    }
    if !(0.0..=1.0).contains(&config.retrieval.default_threshold) {
        anyhow::bail!("retrieval.default_threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.overfetch_factor < 1 {
        anyhow::bail!("retrieval.overfetch_factor must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.max_input_chars == 0 {
        anyhow::bail!("embedding.max_input_chars must be > 0");
    }
    match config.embedding.strategy.as_str() {
        "truncate" | "chunk-mean" => {}
        other => anyhow::bail!(
            "Unknown embedding strategy: '{}'. Must be truncate or chunk-mean.",
            other
        ),
    }

    match config.index.provider.as_str() {
        "disabled" | "rest" => {}
        other => anyhow::bail!(
            "Unknown index provider: '{}'. Must be disabled or rest.",
            other
        ),
    }
    if config.index.is_enabled() && config.index.url.is_none() {
        anyhow::bail!(
            "index.url must be specified when provider is '{}'",
            config.index.provider
        );
    }

    match config.enrichment.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown enrichment provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.enrichment.temperature) {
        anyhow::bail!("enrichment.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
