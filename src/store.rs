//! Record store abstraction.
//!
//! The [`RecordStore`] trait defines the relational system of record for
//! knowledge items. It is the *only* authority for identity and tenancy:
//! the retrieval core re-validates every vector-index hit through
//! [`get_for_workspace`](RecordStore::get_for_workspace) before surfacing
//! it, because index metadata can drift.
//!
//! Implementations must be `Send + Sync` to work with async runtimes:
//! - [`SqliteStore`](crate::store_sqlite::SqliteStore) — sqlx-backed store.
//! - [`MemoryStore`](crate::store_memory::MemoryStore) — in-process maps
//!   for tests and embedded use.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ItemKind, KnowledgeItem};

/// Abstract relational backend for knowledge items.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](RecordStore::insert) | Persist a new item |
/// | [`get`](RecordStore::get) | Fetch by id, no tenant filter (owner-side mutations) |
/// | [`get_for_workspace`](RecordStore::get_for_workspace) | Fetch candidates under a tenant boundary |
/// | [`list_ready`](RecordStore::list_ready) | Scan ready items for the relational fallback |
/// | [`update`](RecordStore::update) | Rewrite mutable fields of an item |
/// | [`delete`](RecordStore::delete) | Remove an item; idempotent |
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new knowledge item.
    async fn insert(&self, item: &KnowledgeItem) -> Result<()>;

    /// Fetch an item by id without a workspace filter.
    ///
    /// For owner-side mutation paths only; search hydration must go
    /// through [`get_for_workspace`](RecordStore::get_for_workspace).
    async fn get(&self, id: &str) -> Result<Option<KnowledgeItem>>;

    /// Fetch the items among `ids` that belong to `workspace_id`.
    ///
    /// Ids with no row, and ids whose row belongs to another workspace,
    /// are silently absent from the result. This is the authoritative
    /// tenant-isolation boundary.
    async fn get_for_workspace(
        &self,
        ids: &[String],
        workspace_id: &str,
    ) -> Result<Vec<KnowledgeItem>>;

    /// Scan ready items for a workspace, optionally narrowed by
    /// collection and kinds, newest first, up to `limit`.
    async fn list_ready(
        &self,
        workspace_id: &str,
        collection_id: Option<&str>,
        kinds: Option<&[ItemKind]>,
        limit: usize,
    ) -> Result<Vec<KnowledgeItem>>;

    /// Rewrite the mutable fields of an existing item.
    ///
    /// `workspace_id`, `id`, and `created_at` are never changed.
    async fn update(&self, item: &KnowledgeItem) -> Result<()>;

    /// Delete an item by id. Deleting an unknown id succeeds.
    async fn delete(&self, id: &str) -> Result<()>;
}
