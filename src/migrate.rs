use anyhow::Result;
use sqlx::SqlitePool;

/// Create the knowledge item schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_items (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            collection_id TEXT,
            kind TEXT NOT NULL DEFAULT 'document',
            title TEXT NOT NULL,
            content TEXT,
            summary TEXT,
            embedding BLOB,
            status TEXT NOT NULL DEFAULT 'processing',
            tags TEXT NOT NULL DEFAULT '[]',
            metadata TEXT NOT NULL DEFAULT '{}',
            content_hash TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_workspace_status ON knowledge_items(workspace_id, status)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_workspace_collection ON knowledge_items(workspace_id, collection_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_updated_at ON knowledge_items(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
