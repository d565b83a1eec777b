//! Core data models used throughout the knowledge search layer.
//!
//! These types represent the knowledge items, vector records, and search
//! results that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// What kind of source a knowledge item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Document,
    Note,
    Url,
    Text,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Document => "document",
            ItemKind::Note => "note",
            ItemKind::Url => "url",
            ItemKind::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(ItemKind::Document),
            "note" => Some(ItemKind::Note),
            "url" => Some(ItemKind::Url),
            "text" => Some(ItemKind::Text),
            _ => None,
        }
    }
}

/// Processing state of a knowledge item.
///
/// Transitions are forward-only: `Processing -> Ready` or
/// `Processing -> Failed`. Both `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Processing,
    Ready,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Processing => "processing",
            ItemStatus::Ready => "ready",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(ItemStatus::Processing),
            "ready" => Some(ItemStatus::Ready),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition(&self, next: ItemStatus) -> bool {
        match (self, next) {
            (ItemStatus::Processing, ItemStatus::Ready) => true,
            (ItemStatus::Processing, ItemStatus::Failed) => true,
            _ => false,
        }
    }
}

/// The unit of retrievable knowledge, as stored in the relational store.
///
/// The relational row is the source of truth; the vector index holds a
/// derived copy of `embedding` plus denormalized metadata for fast
/// candidate filtering.
#[derive(Debug, Clone)]
pub struct KnowledgeItem {
    pub id: String,
    /// Tenant scope. Immutable after creation; every read must match it.
    pub workspace_id: String,
    pub collection_id: Option<String>,
    pub kind: ItemKind,
    pub title: String,
    /// Full extracted text. Absent until processing completes.
    pub content: Option<String>,
    /// AI-generated summary, if enrichment produced one.
    pub summary: Option<String>,
    /// Dense embedding of the content. The relational copy of what lives
    /// in the vector index; this redundancy makes the fallback scan work.
    pub embedding: Option<Vec<f32>>,
    pub status: ItemStatus,
    pub tags: Vec<String>,
    /// Open key-value bag: word count, language, keywords, processing
    /// duration, model used.
    pub metadata: serde_json::Value,
    /// SHA-256 of `content`, used to skip re-embedding unchanged text.
    pub content_hash: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating a knowledge item directly (content already in hand).
#[derive(Debug, Clone)]
pub struct NewKnowledgeItem {
    pub workspace_id: String,
    pub collection_id: Option<String>,
    pub kind: ItemKind,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    /// Precomputed embedding, if the caller's pipeline already has one.
    /// When absent the service embeds `content` itself.
    pub embedding: Option<Vec<f32>>,
    pub status: Option<ItemStatus>,
}

impl NewKnowledgeItem {
    pub fn new(workspace_id: &str, kind: ItemKind, title: &str, content: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            collection_id: None,
            kind,
            title: title.to_string(),
            content: content.to_string(),
            summary: None,
            tags: Vec::new(),
            metadata: serde_json::json!({}),
            embedding: None,
            status: None,
        }
    }
}

/// Partial update for a knowledge item. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub collection_id: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<serde_json::Value>,
    pub status: Option<ItemStatus>,
}

/// Denormalized metadata stored alongside a vector in the index.
///
/// Used for fast candidate filtering only. Never trusted for tenant
/// isolation decisions; the relational record is re-checked on every hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub workspace_id: String,
    #[serde(default)]
    pub collection_id: Option<String>,
    pub kind: ItemKind,
    pub title: String,
    pub status: ItemStatus,
}

/// The vector index's representation of a knowledge item.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Same id as the knowledge item it was derived from.
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A single nearest-neighbor hit from the vector index.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    /// Similarity in [0, 1].
    pub score: f64,
    pub metadata: Option<VectorMetadata>,
}

/// A validated, scored search hit. Ephemeral; produced per query.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub item: KnowledgeItem,
    /// Normalized similarity in [0, 1].
    pub relevance_score: f64,
    /// Query-aware excerpt of the item content.
    pub snippet: String,
}

/// Assembled prompt context: ranked sources plus a synthesized summary
/// that names the contributing titles.
#[derive(Debug, Clone)]
pub struct RagContext {
    pub sources: Vec<SearchResult>,
    pub summary: String,
}

/// A raw file payload handed to the document processor.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Which enrichment steps [`process_document`](crate::processor::DocumentProcessor::process_document)
/// should run. All default to on.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    pub generate_summary: bool,
    pub generate_embedding: bool,
    pub extract_keywords: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            generate_summary: true,
            generate_embedding: true,
            extract_keywords: true,
        }
    }
}

/// Output of the document processing pipeline.
///
/// `word_count` and `processing_time_ms` are always computed locally;
/// the optional fields are best-effort enrichments that may be absent
/// when their step failed.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub content: String,
    pub summary: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub keywords: Option<Vec<String>>,
    pub word_count: usize,
    pub language: Option<String>,
    pub processing_time_ms: u64,
    pub model: Option<String>,
}

/// Advisory classification of a document against existing collections.
#[derive(Debug, Clone)]
pub struct CategorySuggestion {
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_forward_only() {
        assert!(ItemStatus::Processing.can_transition(ItemStatus::Ready));
        assert!(ItemStatus::Processing.can_transition(ItemStatus::Failed));
        assert!(!ItemStatus::Ready.can_transition(ItemStatus::Processing));
        assert!(!ItemStatus::Ready.can_transition(ItemStatus::Failed));
        assert!(!ItemStatus::Failed.can_transition(ItemStatus::Ready));
        assert!(!ItemStatus::Failed.can_transition(ItemStatus::Processing));
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            ItemKind::Document,
            ItemKind::Note,
            ItemKind::Url,
            ItemKind::Text,
        ] {
            assert_eq!(ItemKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ItemKind::parse("image"), None);
    }
}
