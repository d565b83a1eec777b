//! Vector index abstraction and implementations.
//!
//! The index is a performance-oriented cache over embeddings, never a
//! source of truth: its metadata can drift (stale titles, deleted items
//! not yet purged), so every hit is re-validated against the relational
//! store before being surfaced. The index-side workspace filter is a
//! candidate-pruning optimization only.
//!
//! Implementations:
//! - **[`RestVectorIndex`]** — a remote ANN service with an Upstash-style
//!   REST interface (`POST /query`, `/upsert`, `/delete`).
//! - **[`MemoryVectorIndex`]** — brute-force cosine over an in-process
//!   map; used in tests and embedded setups.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use crate::config::IndexConfig;
use crate::embedding::cosine_similarity;
use crate::models::{VectorMatch, VectorMetadata, VectorRecord};

/// Approximate-nearest-neighbor store keyed by knowledge item id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` nearest neighbors of `vector`, best first.
    ///
    /// `workspace_hint` narrows candidates index-side when the backend
    /// supports it; callers must still validate tenancy themselves.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        workspace_hint: Option<&str>,
    ) -> Result<Vec<VectorMatch>>;

    /// Insert or replace the record for an item id.
    async fn upsert(&self, record: VectorRecord) -> Result<()>;

    /// Remove an item id. Deleting an unknown id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;
}

// ============ REST index ============

/// Client for a remote vector index exposing an Upstash-style REST API.
///
/// Authenticates with a bearer token read from the configured environment
/// variable. No retries: the retrieval core treats a single query failure
/// as a signal to fall back, which is cheaper and more predictable than
/// retrying a possibly-degraded index.
pub struct RestVectorIndex {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RestQueryResponse {
    result: Vec<RestMatch>,
}

#[derive(Debug, Deserialize)]
struct RestMatch {
    id: String,
    score: f64,
    #[serde(default)]
    metadata: Option<VectorMetadata>,
}

impl RestVectorIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("index.url required for REST index"))?;
        let token = std::env::var(&config.token_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.token_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("vector index error {}: {}", status, text);
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for RestVectorIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        workspace_hint: Option<&str>,
    ) -> Result<Vec<VectorMatch>> {
        let mut body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeVectors": false,
        });
        if let Some(ws) = workspace_hint {
            // Metadata filter expression; a pruning hint, not a boundary.
            body["filter"] = serde_json::json!(format!("workspace_id = '{}'", ws));
        }

        let response = self.post("/query", body).await?;
        let parsed: RestQueryResponse = response.json().await?;

        Ok(parsed
            .result
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score.clamp(0.0, 1.0),
                metadata: m.metadata,
            })
            .collect())
    }

    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        let body = serde_json::json!({
            "id": record.id,
            "vector": record.vector,
            "metadata": record.metadata,
        });
        self.post("/upsert", body).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let body = serde_json::json!({ "ids": [id] });
        self.post("/delete", body).await?;
        Ok(())
    }
}

// ============ In-memory index ============

/// In-process vector index for tests and embedded use.
///
/// Query is brute-force cosine similarity over all records, with scores
/// clamped to [0, 1] so thresholds behave like the remote index.
pub struct MemoryVectorIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        workspace_hint: Option<&str>,
    ) -> Result<Vec<VectorMatch>> {
        let records = self.records.read().unwrap();
        let mut matches: Vec<VectorMatch> = records
            .values()
            .filter(|r| match workspace_hint {
                Some(ws) => r.metadata.workspace_id == ws,
                None => true,
            })
            .map(|r| VectorMatch {
                id: r.id.clone(),
                score: f64::from(cosine_similarity(vector, &r.vector)).clamp(0.0, 1.0),
                metadata: Some(r.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        let mut records = self.records.write().unwrap();
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut records = self.records.write().unwrap();
        records.remove(id);
        Ok(())
    }
}

/// Create the configured [`VectorIndex`], or `None` when disabled.
///
/// A `None` index sends every search straight to the relational fallback
/// and skips best-effort upserts.
pub fn create_index(config: &IndexConfig) -> Result<Option<Arc<dyn VectorIndex>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "rest" => Ok(Some(Arc::new(RestVectorIndex::new(config)?))),
        other => bail!("Unknown index provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemKind, ItemStatus};

    fn record(id: &str, workspace: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            metadata: VectorMetadata {
                workspace_id: workspace.to_string(),
                collection_id: None,
                kind: ItemKind::Document,
                title: format!("title-{}", id),
                status: ItemStatus::Ready,
            },
        }
    }

    #[tokio::test]
    async fn memory_index_ranks_by_similarity() {
        let index = MemoryVectorIndex::new();
        index.upsert(record("a", "w1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("b", "w1", vec![0.0, 1.0])).await.unwrap();
        index
            .upsert(record("c", "w1", vec![0.7, 0.7]))
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn memory_index_workspace_hint_prunes() {
        let index = MemoryVectorIndex::new();
        index.upsert(record("a", "w1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("b", "w2", vec![1.0, 0.0])).await.unwrap();

        let matches = index.query(&[1.0, 0.0], 10, Some("w1")).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
    }

    #[tokio::test]
    async fn memory_index_upsert_replaces() {
        let index = MemoryVectorIndex::new();
        index.upsert(record("a", "w1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("a", "w1", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(index.len(), 1);

        let matches = index.query(&[0.0, 1.0], 1, None).await.unwrap();
        assert!((matches[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn memory_index_delete_is_idempotent() {
        let index = MemoryVectorIndex::new();
        index.upsert(record("a", "w1", vec![1.0])).await.unwrap();
        index.delete("a").await.unwrap();
        index.delete("a").await.unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn memory_index_scores_clamped_to_unit_range() {
        let index = MemoryVectorIndex::new();
        index.upsert(record("a", "w1", vec![-1.0, 0.0])).await.unwrap();

        let matches = index.query(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(matches[0].score, 0.0);
    }
}
