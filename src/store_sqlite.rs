//! SQLite-backed [`RecordStore`] implementation.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{ItemKind, ItemStatus, KnowledgeItem};
use crate::store::RecordStore;

const ITEM_COLUMNS: &str = "id, workspace_id, collection_id, kind, title, content, summary, \
     embedding, status, tags, metadata, content_hash, created_at, updated_at";

/// Record store over a `knowledge_items` SQLite table.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeItem> {
    let kind_str: String = row.get("kind");
    let kind =
        ItemKind::parse(&kind_str).ok_or_else(|| anyhow!("unknown item kind: {}", kind_str))?;

    let status_str: String = row.get("status");
    let status = ItemStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("unknown item status: {}", status_str))?;

    let tags_json: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    let metadata_json: String = row.get("metadata");
    let metadata: serde_json::Value =
        serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({}));

    let embedding_blob: Option<Vec<u8>> = row.get("embedding");
    let embedding = embedding_blob.map(|blob| blob_to_vec(&blob));

    Ok(KnowledgeItem {
        id: row.get("id"),
        workspace_id: row.get("workspace_id"),
        collection_id: row.get("collection_id"),
        kind,
        title: row.get("title"),
        content: row.get("content"),
        summary: row.get("summary"),
        embedding,
        status,
        tags,
        metadata,
        content_hash: row.get("content_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, item: &KnowledgeItem) -> Result<()> {
        let tags = serde_json::to_string(&item.tags)?;
        let metadata = serde_json::to_string(&item.metadata)?;
        let embedding = item.embedding.as_ref().map(|v| vec_to_blob(v));

        sqlx::query(
            r#"
            INSERT INTO knowledge_items
                (id, workspace_id, collection_id, kind, title, content, summary,
                 embedding, status, tags, metadata, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.workspace_id)
        .bind(&item.collection_id)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(&item.content)
        .bind(&item.summary)
        .bind(embedding)
        .bind(item.status.as_str())
        .bind(tags)
        .bind(metadata)
        .bind(&item.content_hash)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<KnowledgeItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM knowledge_items WHERE id = ?",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn get_for_workspace(
        &self,
        ids: &[String],
        workspace_id: &str,
    ) -> Result<Vec<KnowledgeItem>> {
        let mut items = Vec::with_capacity(ids.len());
        let sql = format!(
            "SELECT {} FROM knowledge_items WHERE id = ? AND workspace_id = ?",
            ITEM_COLUMNS
        );

        for id in ids {
            let row = sqlx::query(&sql)
                .bind(id)
                .bind(workspace_id)
                .fetch_optional(&self.pool)
                .await?;

            if let Some(row) = row {
                items.push(row_to_item(&row)?);
            }
        }

        Ok(items)
    }

    async fn list_ready(
        &self,
        workspace_id: &str,
        collection_id: Option<&str>,
        kinds: Option<&[ItemKind]>,
        limit: usize,
    ) -> Result<Vec<KnowledgeItem>> {
        let mut sql = format!(
            "SELECT {} FROM knowledge_items WHERE workspace_id = ? AND status = 'ready'",
            ITEM_COLUMNS
        );
        if collection_id.is_some() {
            sql.push_str(" AND collection_id = ?");
        }
        let kind_filter = kinds.filter(|k| !k.is_empty());
        if let Some(kinds) = kind_filter {
            let placeholders = vec!["?"; kinds.len()].join(", ");
            sql.push_str(&format!(" AND kind IN ({})", placeholders));
        }
        sql.push_str(" ORDER BY updated_at DESC, id ASC LIMIT ?");

        let mut query = sqlx::query(&sql).bind(workspace_id);
        if let Some(collection) = collection_id {
            query = query.bind(collection);
        }
        if let Some(kinds) = kind_filter {
            for kind in kinds {
                query = query.bind(kind.as_str());
            }
        }
        query = query.bind(limit as i64);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn update(&self, item: &KnowledgeItem) -> Result<()> {
        let tags = serde_json::to_string(&item.tags)?;
        let metadata = serde_json::to_string(&item.metadata)?;
        let embedding = item.embedding.as_ref().map(|v| vec_to_blob(v));

        sqlx::query(
            r#"
            UPDATE knowledge_items SET
                collection_id = ?,
                kind = ?,
                title = ?,
                content = ?,
                summary = ?,
                embedding = ?,
                status = ?,
                tags = ?,
                metadata = ?,
                content_hash = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&item.collection_id)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(&item.content)
        .bind(&item.summary)
        .bind(embedding)
        .bind(item.status.as_str())
        .bind(tags)
        .bind(metadata)
        .bind(&item.content_hash)
        .bind(item.updated_at)
        .bind(&item.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM knowledge_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
