use anyhow::Result;
use sqlx::SqlitePool;
use tracing::debug;

/// Create the schema. Every statement is idempotent, so this runs on every
/// store open and from `kb init`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create chunks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_repo TEXT NOT NULL,
            source_path TEXT NOT NULL,
            source_hash TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_type TEXT NOT NULL,
            text TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '',
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            UNIQUE(source_repo, source_path, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_repo_path ON chunks(source_repo, source_path)",
    )
    .execute(pool)
    .await?;

    // Fingerprint of the last indexed version of each document
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            source_repo TEXT NOT NULL,
            source_path TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL,
            PRIMARY KEY (source_repo, source_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create index_state table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_state (
            source_repo TEXT PRIMARY KEY,
            revision TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    debug!("schema migrations applied");
    Ok(())
}
