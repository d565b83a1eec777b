//! Document processing pipeline.
//!
//! Turns an uploaded file into searchable knowledge: text extraction,
//! then three independent, best-effort enrichments — summary, embedding,
//! and keywords. Extraction failure is fatal (nothing downstream is
//! possible without text); a failed enrichment is logged and its field
//! left absent, without aborting the others. Word count and processing
//! time are always computed locally, so they are available even when
//! every remote step fails.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::chunk::{chunk_text, truncate_chars};
use crate::config::{EmbeddingConfig, EnrichmentConfig};
use crate::embedding::{embed_one, mean_pool, EmbeddingProvider};
use crate::extract::{extract_text, ExtractError};
use crate::generate::ChatModel;
use crate::models::{CategorySuggestion, DocumentFile, ItemKind, ProcessOptions, ProcessedDocument};

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("valid word regex"));

/// How a whole document is reduced to a single embedding vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedStrategy {
    /// Embed the first `max_input_chars` characters only. Content past
    /// the cut point does not influence the vector.
    Truncate,
    /// Chunk on paragraph boundaries, embed each chunk, mean-pool the
    /// batch into one L2-normalized vector.
    ChunkMean,
}

impl EmbedStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "truncate" => Some(EmbedStrategy::Truncate),
            "chunk-mean" => Some(EmbedStrategy::ChunkMean),
            _ => None,
        }
    }
}

/// Inputs for [`DocumentProcessor::suggest_categories`].
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub existing_collections: Vec<String>,
    pub title: String,
    pub kind: ItemKind,
}

/// Stateless document pipeline over injected embedding and chat backends.
pub struct DocumentProcessor {
    embeddings: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    enrichment: EnrichmentConfig,
    strategy: EmbedStrategy,
    embed_budget: usize,
}

impl DocumentProcessor {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        embedding_config: &EmbeddingConfig,
        enrichment: EnrichmentConfig,
    ) -> Self {
        let strategy =
            EmbedStrategy::parse(&embedding_config.strategy).unwrap_or(EmbedStrategy::Truncate);
        Self {
            embeddings,
            chat,
            enrichment,
            strategy,
            embed_budget: embedding_config.max_input_chars,
        }
    }

    /// Run the full pipeline on one file.
    pub async fn process_document(
        &self,
        file: &DocumentFile,
        opts: &ProcessOptions,
    ) -> Result<ProcessedDocument, ExtractError> {
        let started = Instant::now();
        let content = extract_text(file)?;

        let summary = if opts.generate_summary {
            match self.summarize(&content).await {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(file = %file.name, error = %e, "summary generation failed");
                    None
                }
            }
        } else {
            None
        };

        let embedding = if opts.generate_embedding {
            match self.embed_document(&content).await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(file = %file.name, error = %e, "embedding generation failed");
                    None
                }
            }
        } else {
            None
        };

        let keywords = if opts.extract_keywords {
            match self.extract_keywords(&content).await {
                Ok(k) => Some(k),
                Err(e) => {
                    warn!(file = %file.name, error = %e, "keyword extraction failed");
                    None
                }
            }
        } else {
            None
        };

        let model = if opts.generate_summary || opts.extract_keywords {
            Some(self.chat.model_name().to_string())
        } else {
            None
        };

        Ok(ProcessedDocument {
            word_count: word_count(&content),
            language: detect_language(&content),
            processing_time_ms: started.elapsed().as_millis() as u64,
            content,
            summary,
            embedding,
            keywords,
            model,
        })
    }

    /// Produce a single document vector according to the configured strategy.
    pub async fn embed_document(&self, content: &str) -> anyhow::Result<Vec<f32>> {
        let vector = match self.strategy {
            EmbedStrategy::Truncate => {
                embed_one(
                    self.embeddings.as_ref(),
                    truncate_chars(content, self.embed_budget),
                )
                .await?
            }
            EmbedStrategy::ChunkMean => {
                let chunks = chunk_text(content, self.embed_budget);
                let vectors = self.embeddings.embed(&chunks).await?;
                mean_pool(&vectors)
            }
        };
        if vector.is_empty() {
            anyhow::bail!("embedding provider returned an empty vector");
        }
        Ok(vector)
    }

    async fn summarize(&self, content: &str) -> anyhow::Result<String> {
        let input = truncate_chars(content, self.enrichment.summary_input_chars);
        let user = format!(
            "Summarize the following content in 5-7 concise bullet points for a \
             knowledge base. Focus on facts, entities, and key takeaways.\n\n{}",
            input
        );
        self.chat
            .complete(
                "You are a concise technical summarizer.",
                &user,
                self.enrichment.temperature,
            )
            .await
    }

    /// Ask the chat model for keywords. A transport error propagates (the
    /// caller degrades); a response that is not valid JSON yields an empty
    /// list.
    pub async fn extract_keywords(&self, content: &str) -> anyhow::Result<Vec<String>> {
        let input = truncate_chars(content, self.enrichment.keyword_input_chars);
        let raw = self
            .chat
            .complete(
                "Extract 5-12 relevant keywords. Return a JSON array of strings only.",
                input,
                self.enrichment.temperature,
            )
            .await?;
        Ok(parse_string_array(&raw))
    }

    /// Classify content against the caller's existing collections.
    ///
    /// Advisory and never blocking: any failure — transport or parse —
    /// degrades to empty suggestions with mid-range confidence.
    pub async fn suggest_categories(
        &self,
        content: &str,
        request: &SuggestionRequest,
    ) -> CategorySuggestion {
        let system = "You are an assistant that classifies documents into knowledge base \
             collections and proposes tags. Return strict JSON \
             {\"categories\": [..], \"tags\": [..], \"confidence\": 0.0-1.0}.";
        let user = format!(
            "Title: {}\nType: {}\nExisting Collections: {}\n---\nContent:\n{}",
            request.title,
            request.kind.as_str(),
            request.existing_collections.join(", "),
            truncate_chars(content, self.enrichment.classify_input_chars),
        );

        let raw = match self
            .chat
            .complete(system, &user, self.enrichment.temperature)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "category suggestion failed");
                return default_suggestion();
            }
        };

        parse_suggestion(&raw)
    }
}

fn default_suggestion() -> CategorySuggestion {
    CategorySuggestion {
        categories: Vec::new(),
        tags: Vec::new(),
        confidence: 0.6,
    }
}

/// Count words with a word-boundary regex, independent of any AI call.
pub fn word_count(text: &str) -> usize {
    WORD_RE.find_iter(text).count()
}

/// Cheap stop-word language heuristic. Only claims English.
pub fn detect_language(text: &str) -> Option<String> {
    const ENGLISH_STOP_WORDS: &[&str] = &["the", "and", "is", "to", "a", "of", "in", "for"];
    let hits = text
        .to_lowercase()
        .split_whitespace()
        .take(100)
        .filter(|w| ENGLISH_STOP_WORDS.contains(w))
        .count();
    if hits > 5 {
        Some("en".to_string())
    } else {
        None
    }
}

/// Lenient parse of a JSON string array out of model output.
///
/// Accepts a bare array, or an array embedded in surrounding prose.
/// Anything else yields an empty list.
fn parse_string_array(raw: &str) -> Vec<String> {
    if let Some(values) = try_parse_array(raw) {
        return values;
    }
    // The model sometimes wraps the array in prose; try the bracketed slice.
    if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
        if start < end {
            if let Some(values) = try_parse_array(&raw[start..=end]) {
                return values;
            }
        }
    }
    Vec::new()
}

fn try_parse_array(raw: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let array = value.as_array()?;
    Some(
        array
            .iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                other => other.as_f64().map(|n| n.to_string()),
            })
            .collect(),
    )
}

/// Lenient parse of the classification response.
fn parse_suggestion(raw: &str) -> CategorySuggestion {
    let parsed: Option<serde_json::Value> = serde_json::from_str(raw.trim()).ok().or_else(|| {
        let (start, end) = (raw.find('{')?, raw.rfind('}')?);
        if start < end {
            serde_json::from_str(&raw[start..=end]).ok()
        } else {
            None
        }
    });

    let Some(value) = parsed else {
        return default_suggestion();
    };

    let string_list = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|x| x.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    CategorySuggestion {
        categories: string_list("categories"),
        tags: string_list("tags"),
        confidence: value
            .get("confidence")
            .and_then(|c| c.as_f64())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedChat {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedChat {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _system: &str, _user: &str, _temperature: f32) -> Result<String> {
            match self.responses.lock().unwrap().pop() {
                Some(r) => Ok(r),
                None => bail!("no scripted response left"),
            }
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatModel for FailingChat {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _system: &str, _user: &str, _temperature: f32) -> Result<String> {
            bail!("model API error")
        }
    }

    /// Deterministic embedder: vector derived from text length.
    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }

        fn dims(&self) -> usize {
            3
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let n = t.chars().count() as f32;
                    vec![n, 1.0, 0.0]
                })
                .collect())
        }
    }

    fn processor(chat: Arc<dyn ChatModel>, strategy: &str) -> DocumentProcessor {
        let embedding_config = EmbeddingConfig {
            strategy: strategy.to_string(),
            max_input_chars: 50,
            ..Default::default()
        };
        DocumentProcessor::new(
            Arc::new(StubEmbedder),
            chat,
            &embedding_config,
            EnrichmentConfig::default(),
        )
    }

    fn text_file(content: &str) -> DocumentFile {
        DocumentFile {
            name: "notes.txt".to_string(),
            content_type: Some("text/plain".to_string()),
            bytes: content.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn keyword_parse_failure_yields_empty_list() {
        let chat = Arc::new(ScriptedChat::new(&["Sure! Here are some keywords for you."]));
        let p = processor(chat, "truncate");
        let keywords = p.extract_keywords("some document text").await.unwrap();
        assert!(keywords.is_empty());
    }

    #[tokio::test]
    async fn keywords_parse_bare_and_embedded_arrays() {
        let chat = Arc::new(ScriptedChat::new(&[
            r#"["rust", "search"]"#,
            r#"Here you go: ["alpha", "beta"] hope that helps"#,
        ]));
        let p = processor(chat, "truncate");
        assert_eq!(
            p.extract_keywords("text").await.unwrap(),
            vec!["rust".to_string(), "search".to_string()]
        );
        assert_eq!(
            p.extract_keywords("text").await.unwrap(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
    }

    #[tokio::test]
    async fn process_document_survives_failed_enrichments() {
        let p = processor(Arc::new(FailingChat), "truncate");
        let doc = p
            .process_document(
                &text_file("the quick brown fox jumps over the lazy dog"),
                &ProcessOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(doc.content, "the quick brown fox jumps over the lazy dog");
        assert_eq!(doc.word_count, 9);
        assert!(doc.summary.is_none());
        assert!(doc.keywords.is_none());
        // Embedding does not go through chat and still succeeds.
        assert!(doc.embedding.is_some());
    }

    #[tokio::test]
    async fn process_document_skips_unrequested_steps() {
        let p = processor(Arc::new(FailingChat), "truncate");
        let opts = ProcessOptions {
            generate_summary: false,
            generate_embedding: false,
            extract_keywords: false,
        };
        let doc = p.process_document(&text_file("plain text"), &opts).await.unwrap();
        assert!(doc.summary.is_none());
        assert!(doc.embedding.is_none());
        assert!(doc.keywords.is_none());
        assert!(doc.model.is_none());
        assert_eq!(doc.word_count, 2);
    }

    #[tokio::test]
    async fn chunk_mean_pools_multiple_chunks() {
        let p = processor(Arc::new(FailingChat), "chunk-mean");
        let long = "para one text\n\n".repeat(20);
        let vector = p.embed_document(&long).await.unwrap();
        assert_eq!(vector.len(), 3);
        // Mean-pooled output is L2-normalized.
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn suggestion_defaults_on_unparseable_response() {
        let chat = Arc::new(ScriptedChat::new(&["I cannot classify this document."]));
        let p = processor(chat, "truncate");
        let request = SuggestionRequest {
            existing_collections: vec!["Engineering".to_string()],
            title: "Doc".to_string(),
            kind: ItemKind::Document,
        };
        let suggestion = p.suggest_categories("text", &request).await;
        assert!(suggestion.categories.is_empty());
        assert!(suggestion.tags.is_empty());
        assert!((suggestion.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn suggestion_parses_strict_json() {
        let chat = Arc::new(ScriptedChat::new(&[
            r#"{"categories": ["Engineering"], "tags": ["rust", "rag"], "confidence": 0.85}"#,
        ]));
        let p = processor(chat, "truncate");
        let request = SuggestionRequest {
            existing_collections: vec!["Engineering".to_string(), "Sales".to_string()],
            title: "Doc".to_string(),
            kind: ItemKind::Document,
        };
        let suggestion = p.suggest_categories("text", &request).await;
        assert_eq!(suggestion.categories, vec!["Engineering".to_string()]);
        assert_eq!(suggestion.tags.len(), 2);
        assert!((suggestion.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn word_count_uses_word_boundaries() {
        assert_eq!(word_count("hello, world! it's 42"), 5);
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("   \n\t  "), 0);
    }

    #[test]
    fn language_heuristic() {
        let english = "the cat and the dog ran to the park in a hurry for the fun of it";
        assert_eq!(detect_language(english), Some("en".to_string()));
        assert_eq!(detect_language("uno dos tres cuatro"), None);
    }
}
