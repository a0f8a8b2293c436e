use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the index tables. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // One row per index entry; `vector` is little-endian f32, empty for
    // attribute-only entries.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            conversation_id TEXT,
            attributes TEXT NOT NULL DEFAULT '{}',
            vector BLOB NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_entries_conversation ON index_entries(collection, conversation_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
