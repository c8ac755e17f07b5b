//! Storage abstraction for indexed chunks.
//!
//! The [`Store`] trait defines every storage operation the indexer and the
//! query engine need, so the pipeline runs unchanged against SQLite
//! ([`sqlite::SqliteStore`]) or memory ([`memory::InMemoryStore`]).
//!
//! Identity of a chunk is `(source_repo, source_path, chunk_index)`. Beside
//! the chunks, a store records the fingerprint of the last indexed version
//! of each document and one [`IndexState`] cursor per repo.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Chunk, IndexState, QueryResult};

/// Parameters of a similarity search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of results.
    pub limit: usize,
    /// Results with similarity strictly below this are excluded.
    pub threshold: f64,
    /// Only search chunks from this repo.
    pub repo: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            threshold: 0.7,
            repo: None,
        }
    }
}

/// Per-repo counts reported by [`Store::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepoStats {
    pub source_repo: String,
    pub documents: i64,
    pub chunks: i64,
    pub revision: Option<String>,
    pub last_indexed_at: Option<i64>,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](Store::upsert) | Insert a chunk or fully replace the one with the same key |
/// | [`delete_by_path`](Store::delete_by_path) | Remove every chunk and the fingerprint of a document |
/// | [`get_hash_for_path`](Store::get_hash_for_path) | Fingerprint recorded for a document |
/// | [`replace_document`](Store::replace_document) | Evict and rewrite a document's chunks as one unit |
/// | [`search`](Store::search) | Thresholded top-K cosine similarity |
#[async_trait]
pub trait Store: Send + Sync {
    /// Write one chunk. A chunk with the same `(repo, path, chunk_index)` is
    /// replaced in full; fields are never merged. Also records
    /// `chunk.source_hash` as the document fingerprint.
    async fn upsert(&self, chunk: &Chunk) -> Result<()>;

    /// Remove all chunks and the recorded fingerprint for a document.
    /// Returns the number of chunks removed.
    async fn delete_by_path(&self, repo: &str, path: &str) -> Result<u64>;

    /// The fingerprint recorded at the last successful index of a document.
    async fn get_hash_for_path(&self, repo: &str, path: &str) -> Result<Option<String>>;

    /// Evict every chunk of a document, insert `chunks`, and record
    /// `content_hash`, with no reader observing a partial state.
    async fn replace_document(
        &self,
        repo: &str,
        path: &str,
        content_hash: &str,
        chunks: &[Chunk],
    ) -> Result<()>;

    /// Similarity-ranked chunks: descending similarity, none below the
    /// threshold, at most `limit`.
    async fn search(&self, query_vec: &[f32], opts: &SearchOptions) -> Result<Vec<QueryResult>>;

    /// Paths of all documents recorded for a repo, sorted.
    async fn list_paths(&self, repo: &str) -> Result<Vec<String>>;

    /// All chunks of a document ordered by `chunk_index`.
    async fn chunks_for_path(&self, repo: &str, path: &str) -> Result<Vec<Chunk>>;

    async fn get_index_state(&self, repo: &str) -> Result<Option<IndexState>>;

    async fn set_index_state(&self, state: &IndexState) -> Result<()>;

    async fn stats(&self) -> Result<Vec<RepoStats>>;
}

/// Apply the search contract to scored candidates in storage order.
///
/// Drops candidates below the threshold (and NaN scores), sorts by
/// descending similarity keeping storage order for ties, then truncates.
pub(crate) fn rank_results(candidates: Vec<QueryResult>, opts: &SearchOptions) -> Vec<QueryResult> {
    let mut results: Vec<QueryResult> = candidates
        .into_iter()
        .filter(|r| r.similarity >= opts.threshold)
        .collect();
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(opts.limit);
    results
}
