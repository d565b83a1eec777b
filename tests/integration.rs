//! End-to-end tests over the SQLite record store, an in-memory vector
//! index, and a deterministic fake embedder. These exercise the full
//! store → index → search → validate pipeline the way library consumers
//! drive it.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;

use knowledge_rag::config::{DbConfig, RetrievalConfig};
use knowledge_rag::db;
use knowledge_rag::embedding::EmbeddingProvider;
use knowledge_rag::index::{MemoryVectorIndex, VectorIndex};
use knowledge_rag::migrate;
use knowledge_rag::models::{
    ItemKind, ItemStatus, NewKnowledgeItem, VectorMatch, VectorMetadata, VectorRecord,
};
use knowledge_rag::rag::{RagService, SearchParams};
use knowledge_rag::store::RecordStore;
use knowledge_rag::store_sqlite::SqliteStore;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Deterministic embedder: counts topic marker words so that texts about
/// the same topic land close together in vector space.
struct TermEmbedder;

const MARKERS: [&str; 3] = ["rust", "python", "deploy"];

#[async_trait]
impl EmbeddingProvider for TermEmbedder {
    fn model_name(&self) -> &str {
        "term-counter"
    }

    fn dims(&self) -> usize {
        MARKERS.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut v: Vec<f32> = MARKERS
                    .iter()
                    .map(|m| lower.matches(m).count() as f32)
                    .collect();
                v.push(1.0); // bias axis keeps vectors non-zero
                v
            })
            .collect())
    }
}

/// Vector index that always errors, simulating an outage.
struct OutageIndex;

#[async_trait]
impl VectorIndex for OutageIndex {
    async fn query(
        &self,
        _vector: &[f32],
        _top_k: usize,
        _workspace_hint: Option<&str>,
    ) -> Result<Vec<VectorMatch>> {
        bail!("connect timeout")
    }

    async fn upsert(&self, _record: VectorRecord) -> Result<()> {
        bail!("connect timeout")
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        bail!("connect timeout")
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

async fn sqlite_store(tmp: &TempDir) -> Arc<SqliteStore> {
    let db_config = DbConfig {
        path: tmp.path().join("kb.sqlite"),
    };
    let pool = db::connect(&db_config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

fn service(store: Arc<SqliteStore>, index: Option<Arc<dyn VectorIndex>>) -> RagService {
    RagService::new(Arc::new(TermEmbedder), index, store, RetrievalConfig::default())
}

fn rust_note(workspace: &str) -> NewKnowledgeItem {
    let mut item = NewKnowledgeItem::new(
        workspace,
        ItemKind::Note,
        "Rust programming guide",
        "Notes about rust: ownership, borrowing, and more rust idioms.",
    );
    item.tags = vec!["lang".to_string()];
    item.metadata = serde_json::json!({ "source": "test" });
    item
}

fn python_note(workspace: &str) -> NewKnowledgeItem {
    NewKnowledgeItem::new(
        workspace,
        ItemKind::Note,
        "Python basics",
        "Notes about python, python packaging, and python tooling.",
    )
}

fn search(query: &str, workspace: &str, threshold: f64) -> SearchParams {
    SearchParams {
        threshold: Some(threshold),
        ..SearchParams::new(query, workspace)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let db_config = DbConfig {
        path: tmp.path().join("kb.sqlite"),
    };
    let pool = db::connect(&db_config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    pool.close().await;
}

#[tokio::test]
async fn store_then_search_round_trip() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let index = Arc::new(MemoryVectorIndex::new());
    let svc = service(store.clone(), Some(index.clone()));

    let id = svc.store_knowledge_item(rust_note("w1")).await.unwrap();
    svc.store_knowledge_item(python_note("w1")).await.unwrap();
    assert_eq!(index.len(), 2);

    let results = svc
        .search_documents(&search("rust", "w1", 0.5))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].item.id, id);
    assert_eq!(results[0].item.title, "Rust programming guide");

    // Row fields survive the SQLite round trip.
    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.tags, vec!["lang".to_string()]);
    assert_eq!(stored.metadata["source"], "test");
    assert_eq!(stored.status, ItemStatus::Ready);
    assert!(stored.embedding.is_some());
    assert!(stored.content_hash.is_some());
}

#[tokio::test]
async fn ranking_prefers_topical_match() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let index = Arc::new(MemoryVectorIndex::new());
    let svc = service(store, Some(index));

    let rust_id = svc.store_knowledge_item(rust_note("w1")).await.unwrap();
    svc.store_knowledge_item(python_note("w1")).await.unwrap();

    let results = svc
        .search_documents(&search("rust ownership", "w1", 0.0))
        .await
        .unwrap();
    assert_eq!(results[0].item.id, rust_id);
    for pair in results.windows(2) {
        assert!(pair[0].relevance_score >= pair[1].relevance_score);
    }
}

#[tokio::test]
async fn stale_index_metadata_cannot_leak_across_workspaces() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let index = Arc::new(MemoryVectorIndex::new());
    let svc = service(store.clone(), Some(index.clone()));

    let a_id = svc.store_knowledge_item(rust_note("workspace-A")).await.unwrap();
    let b_id = svc.store_knowledge_item(rust_note("workspace-B")).await.unwrap();

    // Poison the index: claim workspace-B's item belongs to workspace-A.
    // The relational store is authoritative, so validation must drop it.
    let b_row = store.get(&b_id).await.unwrap().unwrap();
    index
        .upsert(VectorRecord {
            id: b_id.clone(),
            vector: b_row.embedding.clone().unwrap(),
            metadata: VectorMetadata {
                workspace_id: "workspace-A".to_string(),
                collection_id: None,
                kind: ItemKind::Note,
                title: b_row.title.clone(),
                status: ItemStatus::Ready,
            },
        })
        .await
        .unwrap();

    let results = svc
        .search_documents(&search("rust", "workspace-A", 0.0))
        .await
        .unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.item.id.as_str()).collect();
    assert!(ids.contains(&a_id.as_str()));
    assert!(!ids.contains(&b_id.as_str()), "foreign item leaked");
    assert!(results
        .iter()
        .all(|r| r.item.workspace_id == "workspace-A"));
}

#[tokio::test]
async fn index_outage_degrades_to_relational_fallback() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let svc = service(store, Some(Arc::new(OutageIndex)));

    // The insert succeeds even though the index upsert fails.
    let id = svc.store_knowledge_item(rust_note("w1")).await.unwrap();

    let results = svc
        .search_documents(&search("rust", "w1", 0.5))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].item.id, id);
    assert!(results[0].relevance_score >= 0.5);
}

#[tokio::test]
async fn delete_is_idempotent_and_complete() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let index = Arc::new(MemoryVectorIndex::new());
    let svc = service(store.clone(), Some(index.clone()));

    let id = svc.store_knowledge_item(rust_note("w1")).await.unwrap();
    assert_eq!(index.len(), 1);

    svc.delete_knowledge_item(&id).await.unwrap();
    svc.delete_knowledge_item(&id).await.unwrap();

    assert!(store.get(&id).await.unwrap().is_none());
    assert!(index.is_empty());
    let results = svc
        .search_documents(&search("rust", "w1", 0.0))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn collection_scoping_limits_results() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let svc = service(store, None);

    let mut scoped = rust_note("w1");
    scoped.collection_id = Some("guides".to_string());
    let scoped_id = svc.store_knowledge_item(scoped).await.unwrap();
    svc.store_knowledge_item(rust_note("w1")).await.unwrap();

    let params = SearchParams {
        collection_id: Some("guides".to_string()),
        ..search("rust", "w1", 0.0)
    };
    let results = svc.search_documents(&params).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].item.id, scoped_id);
}

#[tokio::test]
async fn processing_items_stay_invisible_until_ready() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let svc = service(store.clone(), None);

    let id = svc
        .begin_ingest("w1", None, ItemKind::Document, "Pending doc")
        .await
        .unwrap();
    let pending = store.get(&id).await.unwrap().unwrap();
    assert_eq!(pending.status, ItemStatus::Processing);

    let results = svc
        .search_documents(&search("rust", "w1", 0.0))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn update_content_changes_ranking() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let index = Arc::new(MemoryVectorIndex::new());
    let svc = service(store, Some(index));

    let id = svc.store_knowledge_item(python_note("w1")).await.unwrap();
    let before = svc
        .search_documents(&search("rust", "w1", 0.8))
        .await
        .unwrap();
    assert!(before.is_empty());

    svc.update_knowledge_item(
        &id,
        knowledge_rag::models::ItemPatch {
            content: Some("All about rust now. rust rust rust.".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let after = svc
        .search_documents(&search("rust", "w1", 0.8))
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].item.id, id);
}

#[tokio::test]
async fn context_assembly_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store = sqlite_store(&tmp).await;
    let svc = service(store, Some(Arc::new(MemoryVectorIndex::new())));

    svc.store_knowledge_item(rust_note("w1")).await.unwrap();

    let context = svc.get_rag_context("rust idioms", "w1").await.unwrap();
    assert!(!context.sources.is_empty());
    assert!(context.summary.contains("Rust programming guide"));

    // Unknown topic in an empty workspace: empty context, not an error.
    let empty = svc.get_rag_context("deploy", "w-empty").await.unwrap();
    assert!(empty.sources.is_empty());
    assert!(empty.summary.is_empty());
}
