//! SQLite-backed [`Store`] implementation.
//!
//! Chunks, document fingerprints, and index state live in the tables
//! created by [`crate::migrate`]. Embeddings are little-endian `f32` BLOBs.
//! Search loads candidate vectors and ranks them in process with
//! brute-force cosine similarity, in `id` order so ties stay stable.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, similarity_score, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, ChunkType, IndexState, QueryResult};

use super::{rank_results, RepoStats, SearchOptions, Store};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and apply migrations.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const UPSERT_CHUNK: &str = r#"
    INSERT INTO chunks (source_repo, source_path, source_hash, chunk_index, chunk_type,
                        text, context, embedding, metadata_json, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(source_repo, source_path, chunk_index) DO UPDATE SET
        source_hash = excluded.source_hash,
        chunk_type = excluded.chunk_type,
        text = excluded.text,
        context = excluded.context,
        embedding = excluded.embedding,
        metadata_json = excluded.metadata_json,
        created_at = excluded.created_at
"#;

const UPSERT_DOCUMENT: &str = r#"
    INSERT INTO documents (source_repo, source_path, content_hash, indexed_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(source_repo, source_path) DO UPDATE SET
        content_hash = excluded.content_hash,
        indexed_at = excluded.indexed_at
"#;

async fn write_chunk(tx: &mut Transaction<'_, Sqlite>, chunk: &Chunk, now: i64) -> Result<()> {
    let metadata_json = serde_json::to_string(&chunk.metadata)?;
    sqlx::query(UPSERT_CHUNK)
        .bind(&chunk.source_repo)
        .bind(&chunk.source_path)
        .bind(&chunk.source_hash)
        .bind(chunk.chunk_index)
        .bind(chunk.chunk_type.as_str())
        .bind(&chunk.text)
        .bind(&chunk.context)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(metadata_json)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn write_document(
    tx: &mut Transaction<'_, Sqlite>,
    repo: &str,
    path: &str,
    content_hash: &str,
    now: i64,
) -> Result<()> {
    sqlx::query(UPSERT_DOCUMENT)
        .bind(repo)
        .bind(path)
        .bind(content_hash)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn chunk_type_from_row(row: &SqliteRow) -> Result<ChunkType> {
    let raw: String = row.try_get("chunk_type")?;
    ChunkType::parse(&raw).ok_or_else(|| anyhow!("unknown chunk_type in store: {}", raw))
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata = match serde_json::from_str(&metadata_json)? {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    Ok(Chunk {
        source_repo: row.try_get("source_repo")?,
        source_path: row.try_get("source_path")?,
        source_hash: row.try_get("source_hash")?,
        chunk_index: row.try_get("chunk_index")?,
        chunk_type: chunk_type_from_row(row)?,
        text: row.try_get("text")?,
        context: row.try_get("context")?,
        embedding: blob_to_vec(&blob),
        metadata,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert(&self, chunk: &Chunk) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        write_chunk(&mut tx, chunk, now).await?;
        write_document(
            &mut tx,
            &chunk.source_repo,
            &chunk.source_path,
            &chunk.source_hash,
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_path(&self, repo: &str, path: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM chunks WHERE source_repo = ? AND source_path = ?")
            .bind(repo)
            .bind(path)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM documents WHERE source_repo = ? AND source_path = ?")
            .bind(repo)
            .bind(path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn get_hash_for_path(&self, repo: &str, path: &str) -> Result<Option<String>> {
        let hash: Option<String> = sqlx::query_scalar(
            "SELECT content_hash FROM documents WHERE source_repo = ? AND source_path = ?",
        )
        .bind(repo)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    async fn replace_document(
        &self,
        repo: &str,
        path: &str,
        content_hash: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE source_repo = ? AND source_path = ?")
            .bind(repo)
            .bind(path)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            write_chunk(&mut tx, chunk, now).await?;
        }
        write_document(&mut tx, repo, path, content_hash, now).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], opts: &SearchOptions) -> Result<Vec<QueryResult>> {
        let rows = sqlx::query(
            r#"
            SELECT source_repo, source_path, chunk_index, chunk_type, text, context, embedding
            FROM chunks
            WHERE (? IS NULL OR source_repo = ?)
            ORDER BY id
            "#,
        )
        .bind(opts.repo.as_deref())
        .bind(opts.repo.as_deref())
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            candidates.push(QueryResult {
                source_repo: row.try_get("source_repo")?,
                source_path: row.try_get("source_path")?,
                chunk_index: row.try_get("chunk_index")?,
                chunk_type: chunk_type_from_row(row)?,
                context: row.try_get("context")?,
                text: row.try_get("text")?,
                similarity: similarity_score(query_vec, &blob_to_vec(&blob)),
            });
        }

        Ok(rank_results(candidates, opts))
    }

    async fn list_paths(&self, repo: &str) -> Result<Vec<String>> {
        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT source_path FROM documents WHERE source_repo = ? ORDER BY source_path",
        )
        .bind(repo)
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }

    async fn chunks_for_path(&self, repo: &str, path: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT source_repo, source_path, source_hash, chunk_index, chunk_type,
                   text, context, embedding, metadata_json
            FROM chunks
            WHERE source_repo = ? AND source_path = ?
            ORDER BY chunk_index
            "#,
        )
        .bind(repo)
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn get_index_state(&self, repo: &str) -> Result<Option<IndexState>> {
        let row = sqlx::query(
            "SELECT source_repo, revision, updated_at FROM index_state WHERE source_repo = ?",
        )
        .bind(repo)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(IndexState {
                source_repo: row.try_get("source_repo")?,
                revision: row.try_get("revision")?,
                updated_at: row.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn set_index_state(&self, state: &IndexState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_state (source_repo, revision, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(source_repo) DO UPDATE SET
                revision = excluded.revision,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.source_repo)
        .bind(&state.revision)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<Vec<RepoStats>> {
        let rows = sqlx::query(
            r#"
            SELECT r.source_repo AS source_repo,
                   (SELECT COUNT(*) FROM documents d WHERE d.source_repo = r.source_repo) AS documents,
                   (SELECT COUNT(*) FROM chunks c WHERE c.source_repo = r.source_repo) AS chunks,
                   (SELECT MAX(indexed_at) FROM documents d WHERE d.source_repo = r.source_repo) AS last_indexed_at,
                   (SELECT revision FROM index_state s WHERE s.source_repo = r.source_repo) AS revision
            FROM (
                SELECT source_repo FROM documents
                UNION SELECT source_repo FROM chunks
                UNION SELECT source_repo FROM index_state
            ) r
            ORDER BY r.source_repo
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in &rows {
            stats.push(RepoStats {
                source_repo: row.try_get("source_repo")?,
                documents: row.try_get("documents")?,
                chunks: row.try_get("chunks")?,
                revision: row.try_get("revision")?,
                last_indexed_at: row.try_get("last_indexed_at")?,
            });
        }
        Ok(stats)
    }
}
