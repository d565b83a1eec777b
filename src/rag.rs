//! Retrieval core: workspace-isolated semantic search over knowledge items.
//!
//! Search is a strict sequence: embed the query, ask the vector index for
//! candidates (over-fetching to absorb filtering losses), re-validate every
//! candidate against the relational store, score, threshold, order,
//! truncate. The index is a cache; the relational store is the sole
//! authority for identity and tenancy. When the index fails the search
//! degrades to a relational scan ranked by locally computed cosine
//! similarity — it never fails outright because of the index.
//!
//! All dependencies are injected capabilities ([`EmbeddingProvider`],
//! [`VectorIndex`], [`RecordStore`]), so tests substitute fakes without
//! global state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, embed_one, EmbeddingProvider};
use crate::error::RagError;
use crate::index::VectorIndex;
use crate::models::{
    ItemKind, ItemPatch, ItemStatus, KnowledgeItem, NewKnowledgeItem, ProcessedDocument,
    RagContext, SearchResult, VectorMatch, VectorMetadata, VectorRecord,
};
use crate::store::RecordStore;

/// Parameters for [`RagService::search_documents`].
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub workspace_id: String,
    /// Result cap; clamped to the configured maximum. Defaults from config.
    pub limit: Option<usize>,
    /// Minimum relevance score in [0, 1]. Defaults from config.
    pub threshold: Option<f64>,
    pub collection_id: Option<String>,
    pub kinds: Option<Vec<ItemKind>>,
}

impl SearchParams {
    pub fn new(query: &str, workspace_id: &str) -> Self {
        Self {
            query: query.to_string(),
            workspace_id: workspace_id.to_string(),
            limit: None,
            threshold: None,
            collection_id: None,
            kinds: None,
        }
    }
}

/// The retrieval service. Stateless per call; safe to share across tasks.
pub struct RagService {
    embeddings: Arc<dyn EmbeddingProvider>,
    /// `None` when no index is configured: searches go straight to the
    /// relational fallback and writes skip the best-effort upsert.
    index: Option<Arc<dyn VectorIndex>>,
    store: Arc<dyn RecordStore>,
    retrieval: RetrievalConfig,
}

impl RagService {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Option<Arc<dyn VectorIndex>>,
        store: Arc<dyn RecordStore>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embeddings,
            index,
            store,
            retrieval,
        }
    }

    /// Search for relevant knowledge items.
    ///
    /// Returns an empty vec (never an error) when nothing qualifies.
    /// Only embedding and record-store failures propagate; an index
    /// failure degrades to the relational fallback.
    pub async fn search_documents(
        &self,
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>, RagError> {
        let query = params.query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".into()));
        }
        let workspace_id = params.workspace_id.trim();
        if workspace_id.is_empty() {
            return Err(RagError::InvalidInput(
                "workspace_id must not be empty".into(),
            ));
        }

        let limit = params
            .limit
            .unwrap_or(self.retrieval.default_limit)
            .clamp(1, self.retrieval.max_limit);
        let threshold = params
            .threshold
            .unwrap_or(self.retrieval.default_threshold)
            .clamp(0.0, 1.0);

        // No fallback is possible without a query vector.
        let query_vec = embed_one(self.embeddings.as_ref(), query)
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(e.to_string()))?;

        let mut results = match &self.index {
            Some(index) => {
                let top_k = limit.saturating_mul(self.retrieval.overfetch_factor);
                match index.query(&query_vec, top_k, Some(workspace_id)).await {
                    Ok(matches) => {
                        self.hydrate_matches(matches, workspace_id, params, threshold)
                            .await?
                    }
                    Err(e) => {
                        warn!(error = %e, "vector index query failed, using relational fallback");
                        self.fallback_scan(&query_vec, workspace_id, params, limit, threshold)
                            .await?
                    }
                }
            }
            None => {
                self.fallback_scan(&query_vec, workspace_id, params, limit, threshold)
                    .await?
            }
        };

        sort_results(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    /// Validate index candidates against the relational store.
    ///
    /// Candidates with no relational row, or whose row belongs to another
    /// workspace, are silently dropped: the index's own metadata is never
    /// trusted for isolation decisions.
    async fn hydrate_matches(
        &self,
        matches: Vec<VectorMatch>,
        workspace_id: &str,
        params: &SearchParams,
        threshold: f64,
    ) -> Result<Vec<SearchResult>, RagError> {
        let mut ids = Vec::with_capacity(matches.len());
        let mut seen = HashSet::new();
        for m in &matches {
            if seen.insert(m.id.clone()) {
                ids.push(m.id.clone());
            }
        }

        let items = self
            .store
            .get_for_workspace(&ids, workspace_id)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;
        let mut by_id: HashMap<String, KnowledgeItem> =
            items.into_iter().map(|i| (i.id.clone(), i)).collect();

        let mut results = Vec::new();
        for m in matches {
            let Some(item) = by_id.remove(&m.id) else {
                continue; // missing or foreign row: expected filtering outcome
            };
            if !item_passes_filters(&item, params) {
                continue;
            }
            if m.score < threshold {
                continue;
            }
            let snippet = extract_snippet(
                item.content.as_deref().unwrap_or(""),
                &params.query,
                self.retrieval.snippet_chars,
            );
            results.push(SearchResult {
                item,
                relevance_score: m.score,
                snippet,
            });
        }
        Ok(results)
    }

    /// Relational fallback: scan ready items for the workspace and rank by
    /// cosine similarity computed locally. Items without a stored
    /// embedding are excluded from ranking rather than given a default
    /// score.
    async fn fallback_scan(
        &self,
        query_vec: &[f32],
        workspace_id: &str,
        params: &SearchParams,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SearchResult>, RagError> {
        let scan_limit = limit.saturating_mul(self.retrieval.overfetch_factor);
        let items = self
            .store
            .list_ready(
                workspace_id,
                params.collection_id.as_deref(),
                params.kinds.as_deref(),
                scan_limit,
            )
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;

        let mut results = Vec::new();
        for item in items {
            let score = match item.embedding.as_deref() {
                Some(embedding) if !embedding.is_empty() => {
                    f64::from(cosine_similarity(query_vec, embedding)).clamp(0.0, 1.0)
                }
                _ => continue,
            };
            if score < threshold {
                continue;
            }
            let snippet = extract_snippet(
                item.content.as_deref().unwrap_or(""),
                &params.query,
                self.retrieval.snippet_chars,
            );
            results.push(SearchResult {
                item,
                relevance_score: score,
                snippet,
            });
        }
        Ok(results)
    }

    /// Persist a new knowledge item, then mirror it into the vector index.
    ///
    /// The relational insert is authoritative and happens first; the index
    /// upsert is best-effort. An item whose upsert failed is still
    /// discoverable via the relational fallback.
    pub async fn store_knowledge_item(&self, new: NewKnowledgeItem) -> Result<String, RagError> {
        let workspace_id = new.workspace_id.trim();
        if workspace_id.is_empty() {
            return Err(RagError::InvalidInput(
                "workspace_id must not be empty".into(),
            ));
        }
        if new.title.trim().is_empty() {
            return Err(RagError::InvalidInput("title must not be empty".into()));
        }
        if new.content.trim().is_empty() {
            return Err(RagError::InvalidInput("content must not be empty".into()));
        }

        let embedding = match new.embedding {
            Some(v) if !v.is_empty() => v,
            _ => embed_one(self.embeddings.as_ref(), &new.content)
                .await
                .map_err(|e| RagError::EmbeddingUnavailable(e.to_string()))?,
        };

        let now = chrono::Utc::now().timestamp();
        let item = KnowledgeItem {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.to_string(),
            collection_id: new.collection_id,
            kind: new.kind,
            title: new.title,
            content_hash: Some(content_hash(&new.content)),
            content: Some(new.content),
            summary: new.summary,
            embedding: Some(embedding),
            status: new.status.unwrap_or(ItemStatus::Ready),
            tags: new.tags,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        self.store
            .insert(&item)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;

        self.upsert_index(&item).await;
        Ok(item.id)
    }

    /// Apply a partial update. When the content hash changes the item is
    /// re-embedded and the index record refreshed.
    pub async fn update_knowledge_item(&self, id: &str, patch: ItemPatch) -> Result<(), RagError> {
        let mut item = self
            .store
            .get(id)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?
            .ok_or_else(|| RagError::InvalidInput(format!("unknown knowledge item: {}", id)))?;

        if let Some(status) = patch.status {
            if status != item.status && !item.status.can_transition(status) {
                return Err(RagError::InvalidInput(format!(
                    "illegal status transition: {} -> {}",
                    item.status.as_str(),
                    status.as_str()
                )));
            }
            item.status = status;
        }
        if let Some(title) = patch.title {
            item.title = title;
        }
        if let Some(collection_id) = patch.collection_id {
            item.collection_id = collection_id;
        }
        if let Some(tags) = patch.tags {
            item.tags = tags;
        }
        if let Some(metadata) = patch.metadata {
            item.metadata = metadata;
        }
        if let Some(summary) = patch.summary {
            item.summary = Some(summary);
        }

        let mut content_changed = false;
        if let Some(content) = patch.content {
            let hash = content_hash(&content);
            if item.content_hash.as_deref() != Some(hash.as_str()) {
                content_changed = true;
                item.content_hash = Some(hash);
            }
            item.content = Some(content);
        }

        if content_changed {
            let text = item.content.as_deref().unwrap_or("");
            let vector = embed_one(self.embeddings.as_ref(), text)
                .await
                .map_err(|e| RagError::EmbeddingUnavailable(e.to_string()))?;
            item.embedding = Some(vector);
        }

        item.updated_at = chrono::Utc::now().timestamp();
        self.store
            .update(&item)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;

        if content_changed {
            self.upsert_index(&item).await;
        }
        Ok(())
    }

    /// Delete an item from both stores. Idempotent: deleting an unknown id
    /// succeeds. The relational delete goes first — that closes the main
    /// visibility gap fastest, and any stale index entry is dropped at
    /// validation time anyway.
    pub async fn delete_knowledge_item(&self, id: &str) -> Result<(), RagError> {
        self.store
            .delete(id)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;

        if let Some(index) = &self.index {
            if let Err(e) = index.delete(id).await {
                warn!(item_id = %id, error = %e, "vector index delete failed; stale entry will be dropped at validation time");
            }
        }
        Ok(())
    }

    /// Fetch one item under the workspace boundary.
    pub async fn get_knowledge_item(
        &self,
        id: &str,
        workspace_id: &str,
    ) -> Result<Option<KnowledgeItem>, RagError> {
        let items = self
            .store
            .get_for_workspace(&[id.to_string()], workspace_id)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;
        Ok(items.into_iter().next())
    }

    /// Assemble prompt context: search with service defaults, then
    /// synthesize a short summary naming the contributing sources.
    /// An empty result set yields empty sources, not an error.
    pub async fn get_rag_context(
        &self,
        query: &str,
        workspace_id: &str,
    ) -> Result<RagContext, RagError> {
        let params = SearchParams {
            limit: Some(self.retrieval.context_limit),
            threshold: Some(self.retrieval.context_threshold),
            ..SearchParams::new(query, workspace_id)
        };
        let sources = self.search_documents(&params).await?;

        let summary = sources
            .iter()
            .map(|s| format!("{}: {}", s.item.title, s.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(RagContext { sources, summary })
    }

    // ---- Ingestion lifecycle ----

    /// Create a placeholder item in `processing` state for a document
    /// entering the pipeline.
    pub async fn begin_ingest(
        &self,
        workspace_id: &str,
        collection_id: Option<String>,
        kind: ItemKind,
        title: &str,
    ) -> Result<String, RagError> {
        let workspace_id = workspace_id.trim();
        if workspace_id.is_empty() {
            return Err(RagError::InvalidInput(
                "workspace_id must not be empty".into(),
            ));
        }
        if title.trim().is_empty() {
            return Err(RagError::InvalidInput("title must not be empty".into()));
        }

        let now = chrono::Utc::now().timestamp();
        let item = KnowledgeItem {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.to_string(),
            collection_id,
            kind,
            title: title.to_string(),
            content: None,
            summary: None,
            embedding: None,
            status: ItemStatus::Processing,
            tags: Vec::new(),
            metadata: serde_json::json!({}),
            content_hash: None,
            created_at: now,
            updated_at: now,
        };

        self.store
            .insert(&item)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;
        Ok(item.id)
    }

    /// Finish processing: write extracted content and enrichments, move the
    /// item to `ready`, and mirror it into the index.
    pub async fn complete_ingest(
        &self,
        id: &str,
        processed: &ProcessedDocument,
    ) -> Result<(), RagError> {
        let mut item = self
            .store
            .get(id)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?
            .ok_or_else(|| RagError::InvalidInput(format!("unknown knowledge item: {}", id)))?;

        if !item.status.can_transition(ItemStatus::Ready) {
            return Err(RagError::InvalidInput(format!(
                "illegal status transition: {} -> ready",
                item.status.as_str()
            )));
        }

        item.content_hash = Some(content_hash(&processed.content));
        item.content = Some(processed.content.clone());
        item.summary = processed.summary.clone();
        item.embedding = processed.embedding.clone();

        let mut merged = item.metadata.as_object().cloned().unwrap_or_default();
        merged.insert("word_count".into(), processed.word_count.into());
        merged.insert(
            "processing_time_ms".into(),
            processed.processing_time_ms.into(),
        );
        if let Some(language) = &processed.language {
            merged.insert("language".into(), language.as_str().into());
        }
        if let Some(keywords) = &processed.keywords {
            merged.insert("keywords".into(), serde_json::json!(keywords));
        }
        if let Some(model) = &processed.model {
            merged.insert("model".into(), model.as_str().into());
        }
        item.metadata = serde_json::Value::Object(merged);

        item.status = ItemStatus::Ready;
        item.updated_at = chrono::Utc::now().timestamp();

        self.store
            .update(&item)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;

        self.upsert_index(&item).await;
        Ok(())
    }

    /// Mark an ingestion as failed. Missing items and already-terminal
    /// states are left untouched.
    pub async fn fail_ingest(&self, id: &str) -> Result<(), RagError> {
        let item = self
            .store
            .get(id)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))?;
        let Some(mut item) = item else {
            return Ok(());
        };
        if !item.status.can_transition(ItemStatus::Failed) {
            return Ok(());
        }

        item.status = ItemStatus::Failed;
        item.updated_at = chrono::Utc::now().timestamp();
        self.store
            .update(&item)
            .await
            .map_err(|e| RagError::StoreUnavailable(e.to_string()))
    }

    /// Best-effort index mirror of an item. Failures are logged, never
    /// surfaced: the relational store already holds the authoritative row.
    async fn upsert_index(&self, item: &KnowledgeItem) {
        let Some(index) = &self.index else {
            return;
        };
        let Some(vector) = item.embedding.clone().filter(|v| !v.is_empty()) else {
            return;
        };

        let record = VectorRecord {
            id: item.id.clone(),
            vector,
            metadata: VectorMetadata {
                workspace_id: item.workspace_id.clone(),
                collection_id: item.collection_id.clone(),
                kind: item.kind,
                title: item.title.clone(),
                status: item.status,
            },
        };
        if let Err(e) = index.upsert(record).await {
            warn!(item_id = %item.id, error = %e, "vector index upsert failed; item remains searchable via fallback");
        }
    }
}

fn item_passes_filters(item: &KnowledgeItem, params: &SearchParams) -> bool {
    if let Some(collection) = params.collection_id.as_deref() {
        if item.collection_id.as_deref() != Some(collection) {
            return false;
        }
    }
    if let Some(kinds) = params.kinds.as_deref() {
        if !kinds.is_empty() && !kinds.contains(&item.kind) {
            return false;
        }
    }
    true
}

/// Sort: score desc, updated_at desc, id asc (deterministic).
fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.item.updated_at.cmp(&a.item.updated_at))
            .then(a.item.id.cmp(&b.item.id))
    });
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Pick the `max_chars` window of `content` with the best query-term
/// coverage, with `...` affixes when content was cut. Char-boundary safe.
pub fn extract_snippet(content: &str, query: &str, max_chars: usize) -> String {
    if content.is_empty() || max_chars == 0 {
        return String::new();
    }
    let total_chars = content.chars().count();
    if total_chars <= max_chars {
        return content.to_string();
    }

    let terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut best_start = 0usize;
    if !terms.is_empty() {
        let stride = (max_chars / 4).max(1);
        let mut best_score = 0usize;
        let mut start = 0usize;
        while start + max_chars <= total_chars {
            let window = slice_chars(content, start, max_chars).to_lowercase();
            let score = terms.iter().filter(|t| window.contains(t.as_str())).count();
            if score > best_score {
                best_score = score;
                best_start = start;
            }
            start += stride;
        }
    }

    let snippet = slice_chars(content, best_start, max_chars);
    let prefix = if best_start > 0 { "..." } else { "" };
    let suffix = if best_start + max_chars < total_chars {
        "..."
    } else {
        ""
    };
    format!("{}{}{}", prefix, snippet.trim(), suffix)
}

/// Slice `len` chars starting at char offset `start`.
fn slice_chars(s: &str, start: usize, len: usize) -> &str {
    let mut indices = s.char_indices().skip(start);
    let Some((begin, _)) = indices.next() else {
        return "";
    };
    match s[begin..].char_indices().nth(len) {
        Some((offset, _)) => &s[begin..begin + offset],
        None => &s[begin..],
    }
}
