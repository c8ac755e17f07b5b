//! In-memory [`Store`] implementation for tests and embedding in other tools.
//!
//! Chunks live in a `Vec` behind a `std::sync::RwLock`, so storage order is
//! insertion order. Search is brute-force cosine similarity.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::similarity_score;
use crate::models::{Chunk, IndexState, QueryResult};

use super::{rank_results, RepoStats, SearchOptions, Store};

type DocKey = (String, String);

struct DocRecord {
    content_hash: String,
    indexed_at: i64,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    chunks: RwLock<Vec<Chunk>>,
    docs: RwLock<HashMap<DocKey, DocRecord>>,
    states: RwLock<HashMap<String, IndexState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn same_doc(chunk: &Chunk, repo: &str, path: &str) -> bool {
    chunk.source_repo == repo && chunk.source_path == path
}

fn key(repo: &str, path: &str) -> DocKey {
    (repo.to_string(), path.to_string())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert(&self, chunk: &Chunk) -> Result<()> {
        {
            let mut chunks = write(&self.chunks)?;
            let existing = chunks.iter_mut().find(|c| {
                same_doc(c, &chunk.source_repo, &chunk.source_path)
                    && c.chunk_index == chunk.chunk_index
            });
            match existing {
                Some(slot) => *slot = chunk.clone(),
                None => chunks.push(chunk.clone()),
            }
        }
        write(&self.docs)?.insert(
            key(&chunk.source_repo, &chunk.source_path),
            DocRecord {
                content_hash: chunk.source_hash.clone(),
                indexed_at: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    async fn delete_by_path(&self, repo: &str, path: &str) -> Result<u64> {
        let mut chunks = write(&self.chunks)?;
        let before = chunks.len();
        chunks.retain(|c| !same_doc(c, repo, path));
        write(&self.docs)?.remove(&key(repo, path));
        Ok((before - chunks.len()) as u64)
    }

    async fn get_hash_for_path(&self, repo: &str, path: &str) -> Result<Option<String>> {
        Ok(read(&self.docs)?
            .get(&key(repo, path))
            .map(|d| d.content_hash.clone()))
    }

    async fn replace_document(
        &self,
        repo: &str,
        path: &str,
        content_hash: &str,
        new_chunks: &[Chunk],
    ) -> Result<()> {
        // Both locks are held for the whole swap.
        let mut chunks = write(&self.chunks)?;
        let mut docs = write(&self.docs)?;
        chunks.retain(|c| !same_doc(c, repo, path));
        chunks.extend(new_chunks.iter().cloned());
        docs.insert(
            key(repo, path),
            DocRecord {
                content_hash: content_hash.to_string(),
                indexed_at: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], opts: &SearchOptions) -> Result<Vec<QueryResult>> {
        let chunks = read(&self.chunks)?;
        let candidates = chunks
            .iter()
            .filter(|c| opts.repo.as_deref().is_none_or(|r| c.source_repo == r))
            .map(|c| QueryResult {
                source_repo: c.source_repo.clone(),
                source_path: c.source_path.clone(),
                chunk_index: c.chunk_index,
                chunk_type: c.chunk_type,
                context: c.context.clone(),
                text: c.text.clone(),
                similarity: similarity_score(query_vec, &c.embedding),
            })
            .collect();
        Ok(rank_results(candidates, opts))
    }

    async fn list_paths(&self, repo: &str) -> Result<Vec<String>> {
        let mut paths: Vec<String> = read(&self.docs)?
            .keys()
            .filter(|(r, _)| r == repo)
            .map(|(_, p)| p.clone())
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn chunks_for_path(&self, repo: &str, path: &str) -> Result<Vec<Chunk>> {
        let mut found: Vec<Chunk> = read(&self.chunks)?
            .iter()
            .filter(|c| same_doc(c, repo, path))
            .cloned()
            .collect();
        found.sort_by_key(|c| c.chunk_index);
        Ok(found)
    }

    async fn get_index_state(&self, repo: &str) -> Result<Option<IndexState>> {
        Ok(read(&self.states)?.get(repo).cloned())
    }

    async fn set_index_state(&self, state: &IndexState) -> Result<()> {
        write(&self.states)?.insert(state.source_repo.clone(), state.clone());
        Ok(())
    }

    async fn stats(&self) -> Result<Vec<RepoStats>> {
        let chunks = read(&self.chunks)?;
        let docs = read(&self.docs)?;
        let states = read(&self.states)?;

        let mut by_repo: BTreeMap<String, RepoStats> = BTreeMap::new();
        fn entry<'a>(map: &'a mut BTreeMap<String, RepoStats>, repo: &str) -> &'a mut RepoStats {
            map.entry(repo.to_string()).or_insert_with(|| RepoStats {
                source_repo: repo.to_string(),
                ..RepoStats::default()
            })
        }

        for ((repo, _), doc) in docs.iter() {
            let s = entry(&mut by_repo, repo);
            s.documents += 1;
            s.last_indexed_at = s.last_indexed_at.max(Some(doc.indexed_at));
        }
        for c in chunks.iter() {
            entry(&mut by_repo, &c.source_repo).chunks += 1;
        }
        for state in states.values() {
            entry(&mut by_repo, &state.source_repo).revision = Some(state.revision.clone());
        }

        Ok(by_repo.into_values().collect())
    }
}
