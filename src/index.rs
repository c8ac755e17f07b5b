//! Indexing pipeline orchestration.
//!
//! Coordinates the per-file flow: fingerprint → change check → extraction →
//! chunking → embedding → storage. Files are processed one at a time and
//! chunks within a file are embedded in order.
//!
//! # Failure handling
//!
//! - A chunk whose embedding fails is dropped and counted; the file continues.
//! - A file whose chunks all fail to embed, or that cannot be read, extracted,
//!   or written, is recorded as failed and the run continues.
//! - Configuration problems (missing corpus root, invalid globs) abort the run.
//!
//! A changed document is rewritten with [`Store::replace_document`], so the
//! eviction of stale chunks and the insertion of new ones land together.
//!
//! # Incremental mode
//!
//! With `incremental` set and a stored revision marker, the candidate set
//! comes from the git change set since that marker instead of a full walk.
//! Stored paths that no longer exist on disk are treated as deleted as
//! well, which covers files that were never tracked by git.
//! Outside git, or when the diff cannot be computed, the run falls back to
//! the full fingerprint scan.

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

use crate::chunk::chunk_with_config;
use crate::config::Config;
use crate::corpus::{self, CorpusFilter};
use crate::embedding::Embedder;
use crate::extract;
use crate::hashing::{fingerprint, needs_reindex};
use crate::models::{Chunk, FileFailure, IndexReport, IndexState, SourceDocument};
use crate::revision;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

/// Options for one indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Re-index every file even when its fingerprint is unchanged.
    pub full_reindex: bool,
    /// Use the git change set since the stored revision marker.
    pub incremental: bool,
    /// Overrides `corpus.repo` as the label stored on every chunk.
    pub repo_label: Option<String>,
}

/// What happened to one file.
enum FileOutcome {
    Skipped,
    Indexed { chunks: u64 },
    Failed(String),
}

/// Files to visit and stored paths to remove.
struct Plan {
    candidates: Vec<String>,
    deleted: Vec<String>,
}

/// Runs indexing against any [`Store`] with a configured [`Embedder`].
pub struct Indexer<'a, S: Store> {
    config: &'a Config,
    store: &'a S,
    embedder: &'a Embedder,
}

impl<'a, S: Store> Indexer<'a, S> {
    pub fn new(config: &'a Config, store: &'a S, embedder: &'a Embedder) -> Self {
        Self {
            config,
            store,
            embedder,
        }
    }

    /// Index the configured corpus.
    pub async fn run(&self, opts: &IndexOptions) -> Result<IndexReport> {
        let root = &self.config.corpus.root;
        if !root.is_dir() {
            bail!("Corpus root does not exist: {}", root.display());
        }

        let repo = opts
            .repo_label
            .clone()
            .unwrap_or_else(|| self.config.corpus.repo_label());
        let marker = revision::current_marker(root);
        let plan = self.plan(&repo, opts).await?;

        let mut report = IndexReport {
            revision: Some(marker.clone()),
            ..IndexReport::default()
        };

        for path in &plan.candidates {
            let outcome = match corpus::read_relative(&self.config.corpus, path, &repo) {
                Ok(doc) => self.index_document(&doc, opts.full_reindex, &mut report).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(FileOutcome::Skipped) => report.files_skipped += 1,
                Ok(FileOutcome::Indexed { chunks }) => {
                    report.files_indexed += 1;
                    report.chunks_written += chunks;
                }
                Ok(FileOutcome::Failed(reason)) => record_failure(&mut report, path, reason),
                Err(e) => record_failure(&mut report, path, format!("{:#}", e)),
            }
        }

        report.deleted_paths = plan.deleted;
        if self.config.indexing.prune_deleted {
            for path in report.deleted_paths.clone() {
                match self.store.delete_by_path(&repo, &path).await {
                    Ok(removed) => {
                        debug!(path = %path, chunks = removed, "removed deleted file");
                        report.files_removed += 1;
                    }
                    Err(e) => record_failure(&mut report, &path, format!("{:#}", e)),
                }
            }
        }

        if !report.has_failures() || report.files_indexed > 0 {
            self.store
                .set_index_state(&IndexState {
                    source_repo: repo.clone(),
                    revision: marker,
                    updated_at: chrono::Utc::now().timestamp(),
                })
                .await?;
        }

        info!(
            repo = %repo,
            indexed = report.files_indexed,
            skipped = report.files_skipped,
            failed = report.files_failed,
            removed = report.files_removed,
            chunks = report.chunks_written,
            "index run complete"
        );

        Ok(report)
    }

    /// Decide which files to visit and which stored paths are gone.
    async fn plan(&self, repo: &str, opts: &IndexOptions) -> Result<Plan> {
        let root = &self.config.corpus.root;
        let stored: BTreeSet<String> = self.store.list_paths(repo).await?.into_iter().collect();

        if opts.incremental && !opts.full_reindex {
            if let Some(state) = self.store.get_index_state(repo).await? {
                if revision::is_git_worktree(root) {
                    match revision::diff_since(root, &state.revision) {
                        Ok(changes) => {
                            let filter = CorpusFilter::new(&self.config.corpus)?;
                            let candidates = changes
                                .changed()
                                .filter(|p| filter.matches(p) && root.join(p.as_str()).is_file())
                                .cloned()
                                .collect();
                            // Untracked files never show up as `D`, so any
                            // stored path missing from disk is gone too.
                            let deleted: BTreeSet<String> = changes
                                .deleted
                                .into_iter()
                                .filter(|p| stored.contains(p))
                                .chain(
                                    stored
                                        .iter()
                                        .filter(|p| !root.join(p.as_str()).exists())
                                        .cloned(),
                                )
                                .collect();
                            debug!(since = %state.revision, "using git change set");
                            return Ok(Plan {
                                candidates,
                                deleted: deleted.into_iter().collect(),
                            });
                        }
                        Err(e) => {
                            let reason = format!("{:#}", e);
                            warn!(error = %reason, "git diff failed; falling back to full scan");
                        }
                    }
                }
            }
        }

        let candidates = corpus::list_paths(&self.config.corpus)?;
        let present: BTreeSet<&str> = candidates.iter().map(String::as_str).collect();
        let deleted = stored
            .iter()
            .filter(|p| !present.contains(p.as_str()))
            .cloned()
            .collect();
        Ok(Plan {
            candidates,
            deleted,
        })
    }

    async fn index_document(
        &self,
        doc: &SourceDocument,
        force: bool,
        report: &mut IndexReport,
    ) -> Result<FileOutcome> {
        let repo = &doc.source_repo;
        let path = &doc.source_path;

        let hash = fingerprint(&doc.bytes);
        let stored = self.store.get_hash_for_path(repo, path).await?;
        if !needs_reindex(stored.as_deref(), &hash, force) {
            debug!(path = %path, "unchanged, skipping");
            return Ok(FileOutcome::Skipped);
        }

        let text = extract::document_text(&doc.bytes, doc.kind)
            .with_context(|| format!("Failed to extract text from {}", path))?;
        let raws = chunk_with_config(&text, doc.kind, &self.config.chunking);

        let texts: Vec<&str> = raws.iter().map(|r| r.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await;

        let mut chunks = Vec::with_capacity(raws.len());
        for (raw, result) in raws.iter().zip(embeddings) {
            let embedding = match result {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!(
                        path = %path,
                        chunk_index = raw.chunk_index,
                        error = %e,
                        "chunk embedding failed; skipping chunk"
                    );
                    report.chunks_failed += 1;
                    continue;
                }
            };

            if let Some(t) = embedding.truncated {
                warn!(
                    path = %path,
                    chunk_index = raw.chunk_index,
                    original_chars = t.original_chars,
                    kept_chars = t.kept_chars,
                    "chunk truncated before embedding"
                );
                report.truncated_chunks += 1;
            }

            let mut metadata = serde_json::Map::new();
            metadata.insert("kind".to_string(), doc.kind.as_str().into());
            metadata.insert("char_count".to_string(), raw.text.chars().count().into());
            metadata.insert("truncated".to_string(), embedding.truncated.is_some().into());

            chunks.push(Chunk {
                source_repo: repo.clone(),
                source_path: path.clone(),
                source_hash: hash.clone(),
                chunk_index: raw.chunk_index,
                chunk_type: raw.chunk_type,
                text: raw.text.clone(),
                context: raw.context.clone(),
                embedding: embedding.vector,
                metadata,
            });
        }

        if !raws.is_empty() && chunks.is_empty() {
            // Stale chunks must not outlive the version they came from, and
            // dropping the fingerprint makes the next run retry the file.
            self.store.delete_by_path(repo, path).await?;
            return Ok(FileOutcome::Failed(format!(
                "all {} chunks failed to embed",
                raws.len()
            )));
        }

        self.store
            .replace_document(repo, path, &hash, &chunks)
            .await
            .with_context(|| format!("Failed to write chunks for {}", path))?;

        debug!(path = %path, chunks = chunks.len(), "indexed");
        Ok(FileOutcome::Indexed {
            chunks: chunks.len() as u64,
        })
    }
}

fn record_failure(report: &mut IndexReport, path: &str, reason: String) {
    error!(path = %path, reason = %reason, "failed to index file");
    report.files_failed += 1;
    report.failures.push(FileFailure {
        source_path: path.to_string(),
        reason,
    });
}

/// `kb index`: open the database, run the indexer, print the report.
pub async fn run_index(config: &Config, opts: &IndexOptions) -> Result<IndexReport> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in the config to index.");
    }

    let store = SqliteStore::open(config).await?;
    let embedder = Embedder::from_config(&config.embedding)?;
    let report = Indexer::new(config, &store, &embedder).run(opts).await?;

    print_report(&report);
    Ok(report)
}

fn print_report(report: &IndexReport) {
    println!("index");
    println!("  files indexed: {}", report.files_indexed);
    println!("  files skipped: {}", report.files_skipped);
    println!("  files failed: {}", report.files_failed);
    println!("  files removed: {}", report.files_removed);
    println!("  chunks written: {}", report.chunks_written);
    if report.chunks_failed > 0 {
        println!("  chunks failed: {}", report.chunks_failed);
    }
    if report.truncated_chunks > 0 {
        println!("  truncated chunks: {}", report.truncated_chunks);
    }
    if let Some(rev) = &report.revision {
        println!("  revision: {}", rev);
    }
    for failure in &report.failures {
        println!("  failed: {} ({})", failure.source_path, failure.reason);
    }
    if report.has_failures() {
        println!("completed with failures");
    } else {
        println!("ok");
    }
}
