//! End-to-end indexing and query tests against both store backends,
//! driven by a deterministic bag-of-words embedding provider.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use knowledge_harness::config::Config;
use knowledge_harness::db;
use knowledge_harness::embedding::{EmbedError, Embedder, EmbeddingProvider};
use knowledge_harness::index::{IndexOptions, Indexer};
use knowledge_harness::migrate;
use knowledge_harness::models::{ChunkType, IndexReport};
use knowledge_harness::query::{QueryEngine, QueryOptions, QueryOutcome};
use knowledge_harness::store::memory::InMemoryStore;
use knowledge_harness::store::sqlite::SqliteStore;
use knowledge_harness::store::Store;

const DIMS: usize = 256;

/// Hashes each lowercase word into one of `DIMS` buckets. Fails any text
/// containing `FAILEMBED`. Counts calls.
#[derive(Clone, Default)]
struct BagOfWords {
    calls: Arc<AtomicUsize>,
}

impl BagOfWords {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("FAILEMBED") {
            return Err(EmbedError::Http {
                status: 500,
                body: "induced failure".to_string(),
            });
        }
        let mut v = vec![0.0f32; DIMS];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[(fnv1a(word) % DIMS as u64) as usize] += 1.0;
        }
        Ok(v)
    }
}

fn write_corpus(root: &Path) {
    fs::create_dir_all(root).unwrap();
    fs::write(
        root.join("alpha.md"),
        "# Alpha\n\nRust programming with cargo and crates.\n\n## Testing\n\nUnit tests run with cargo test.",
    )
    .unwrap();
    fs::write(
        root.join("beta.md"),
        "# Beta\n\nPython notebooks for machine learning.",
    )
    .unwrap();
    fs::write(
        root.join("gamma.txt"),
        "Gamma plain notes.\n\nKubernetes deployment and Docker images.",
    )
    .unwrap();
}

fn config(tmp: &TempDir, extra: &str) -> Config {
    let toml = format!(
        r#"
[db]
path = "{db}"

[corpus]
root = "{root}"
repo = "handbook"
{extra}
"#,
        db = tmp.path().join("data/kb.sqlite").display(),
        root = tmp.path().join("corpus").display(),
        extra = extra,
    );
    Config::from_toml_str(&toml).unwrap()
}

fn embedder(provider: &BagOfWords) -> Embedder {
    Embedder::new(Box::new(provider.clone()), 30_000)
}

async fn run<S: Store>(
    cfg: &Config,
    store: &S,
    embedder: &Embedder,
    opts: IndexOptions,
) -> IndexReport {
    Indexer::new(cfg, store, embedder).run(&opts).await.unwrap()
}

async fn snapshot<S: Store>(store: &S, path: &str) -> Vec<(i64, String, String)> {
    store
        .chunks_for_path("handbook", path)
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.chunk_index, c.text, c.context))
        .collect()
}

async fn open_sqlite(tmp: &TempDir) -> SqliteStore {
    let pool = db::connect_path(&tmp.path().join("data/kb.sqlite"))
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    SqliteStore::new(pool)
}

#[tokio::test]
async fn test_first_run_indexes_every_file() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("corpus"));
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    let report = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;

    assert_eq!(report.files_indexed, 3);
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.chunks_written, 5);
    assert!(!report.has_failures());

    let alpha = store.chunks_for_path("handbook", "alpha.md").await.unwrap();
    assert_eq!(alpha.len(), 2);
    assert_eq!(alpha[0].context, "Alpha");
    assert_eq!(alpha[1].context, "Alpha > Testing");
    assert_eq!(alpha[1].chunk_type, ChunkType::Heading);
    assert_eq!(alpha[0].metadata["kind"], "markdown");
    assert_eq!(alpha[0].metadata["char_count"], 39);
    assert_eq!(alpha[0].metadata["truncated"], false);

    let gamma = store.chunks_for_path("handbook", "gamma.txt").await.unwrap();
    assert_eq!(gamma.len(), 2);
    assert!(gamma.iter().all(|c| c.chunk_type == ChunkType::Paragraph));

    let state = store.get_index_state("handbook").await.unwrap().unwrap();
    assert_eq!(Some(state.revision), report.revision);
}

#[tokio::test]
async fn test_full_reindex_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("corpus"));
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();
    let full = IndexOptions {
        full_reindex: true,
        ..IndexOptions::default()
    };

    run(&cfg, &store, &embedder(&provider), full.clone()).await;
    let first = snapshot(&store, "alpha.md").await;
    let report = run(&cfg, &store, &embedder(&provider), full).await;
    let second = snapshot(&store, "alpha.md").await;

    assert_eq!(report.files_indexed, 3);
    assert_eq!(first, second);
    assert_eq!(store.stats().await.unwrap()[0].chunks, 5);
}

#[tokio::test]
async fn test_unchanged_files_are_skipped() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("corpus"));
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    let calls_after_first = provider.calls();

    let report = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    assert_eq!(report.files_indexed, 0);
    assert_eq!(report.files_skipped, 3);
    assert_eq!(provider.calls(), calls_after_first);
}

#[tokio::test]
async fn test_changed_file_is_fully_regenerated() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    write_corpus(&root);
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    let old_hash = store.get_hash_for_path("handbook", "alpha.md").await.unwrap();

    // Shrink from two sections to one.
    fs::write(root.join("alpha.md"), "# Alpha\n\nRust programming, revised.").unwrap();
    let report = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;

    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_skipped, 2);
    let alpha = snapshot(&store, "alpha.md").await;
    assert_eq!(
        alpha,
        vec![(0, "Rust programming, revised.".to_string(), "Alpha".to_string())]
    );
    let new_hash = store.get_hash_for_path("handbook", "alpha.md").await.unwrap();
    assert_ne!(old_hash, new_hash);
}

#[tokio::test]
async fn test_deleted_files_are_pruned() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    write_corpus(&root);
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    fs::remove_file(root.join("beta.md")).unwrap();

    let report = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    assert_eq!(report.deleted_paths, vec!["beta.md"]);
    assert_eq!(report.files_removed, 1);
    assert!(store.chunks_for_path("handbook", "beta.md").await.unwrap().is_empty());
    assert_eq!(
        store.list_paths("handbook").await.unwrap(),
        vec!["alpha.md", "gamma.txt"]
    );
}

#[tokio::test]
async fn test_deleted_files_kept_when_pruning_disabled() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    write_corpus(&root);
    let cfg = config(&tmp, "\n[indexing]\nprune_deleted = false\n");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    fs::remove_file(root.join("beta.md")).unwrap();

    let report = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    assert_eq!(report.deleted_paths, vec!["beta.md"]);
    assert_eq!(report.files_removed, 0);
    assert_eq!(store.chunks_for_path("handbook", "beta.md").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_single_chunk_failure_does_not_abort_file() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    fs::write(
        root.join("mixed.md"),
        "# Good\n\nThis embeds fine.\n\n# Bad\n\nThis one says FAILEMBED.\n\n# Also good\n\nStill fine.",
    )
    .unwrap();
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    let report = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.chunks_failed, 1);
    assert_eq!(report.chunks_written, 2);

    let indices: Vec<i64> = snapshot(&store, "mixed.md").await.iter().map(|c| c.0).collect();
    assert_eq!(indices, vec![0, 2]);

    let again = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    assert_eq!(again.files_skipped, 1);
}

#[tokio::test]
async fn test_all_chunks_failing_counts_file_as_failed() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("doc.md"), "# Doc\n\nFine at first.").unwrap();
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    let state_before = store.get_index_state("handbook").await.unwrap();

    fs::write(root.join("doc.md"), "# Doc\n\nNow FAILEMBED everywhere.").unwrap();
    let report = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;

    assert_eq!(report.files_failed, 1);
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.failures[0].source_path, "doc.md");
    assert!(report.failures[0].reason.contains("failed to embed"));
    assert!(report.has_failures());

    // Stale chunks are gone and the next run retries the file.
    assert!(store.chunks_for_path("handbook", "doc.md").await.unwrap().is_empty());
    assert!(store.get_hash_for_path("handbook", "doc.md").await.unwrap().is_none());

    // Nothing progressed, so the cursor stays where it was.
    assert_eq!(store.get_index_state("handbook").await.unwrap(), state_before);
}

#[tokio::test]
async fn test_unreadable_file_fails_alone() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    write_corpus(&root);
    fs::write(root.join("broken.txt"), [0xffu8, 0xfe, 0x00, 0x41]).unwrap();
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    let report = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    assert_eq!(report.files_indexed, 3);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.failures[0].source_path, "broken.txt");
    assert!(report.failures[0].reason.contains("UTF-8"));
    assert!(store.get_index_state("handbook").await.unwrap().is_some());
}

#[tokio::test]
async fn test_empty_file_is_recorded_and_skipped() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("empty.md"), "   \n\n").unwrap();
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    let first = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    assert_eq!(first.files_indexed, 1);
    assert_eq!(first.chunks_written, 0);

    let second = run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    assert_eq!(second.files_skipped, 1);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_truncated_chunks_are_counted() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("corpus"));
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();
    let short = Embedder::new(Box::new(provider.clone()), 20);

    let report = run(&cfg, &store, &short, IndexOptions::default()).await;
    // Every chunk except "Gamma plain notes." is longer than 20 chars.
    assert_eq!(report.truncated_chunks, 4);

    let alpha = store.chunks_for_path("handbook", "alpha.md").await.unwrap();
    assert_eq!(alpha[0].metadata["truncated"], true);
    // The stored text is never truncated.
    assert_eq!(alpha[0].text, "Rust programming with cargo and crates.");
}

#[tokio::test]
async fn test_csv_is_indexed_as_table() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("people.csv"), "name,role\nAda,engineer\n").unwrap();
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    run(&cfg, &store, &embedder(&provider), IndexOptions::default()).await;
    let chunks = store.chunks_for_path("handbook", "people.csv").await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.starts_with("| name | role |"));
    assert_eq!(chunks[0].metadata["kind"], "csv_converted");
}

#[tokio::test]
async fn test_repo_label_override() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("corpus"));
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    let opts = IndexOptions {
        repo_label: Some("wiki".to_string()),
        ..IndexOptions::default()
    };
    run(&cfg, &store, &embedder(&provider), opts).await;

    assert_eq!(store.list_paths("wiki").await.unwrap().len(), 3);
    assert!(store.list_paths("handbook").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_corpus_root_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();
    let embedder = embedder(&provider);

    let err = Indexer::new(&cfg, &store, &embedder)
        .run(&IndexOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Corpus root does not exist"));
    assert!(store.get_index_state("handbook").await.unwrap().is_none());
}

#[tokio::test]
async fn test_sqlite_index_then_query() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("corpus"));
    let cfg = config(&tmp, "");
    let store = open_sqlite(&tmp).await;
    let provider = BagOfWords::default();
    let embedder = embedder(&provider);

    let report = run(&cfg, &store, &embedder, IndexOptions::default()).await;
    assert_eq!(report.files_indexed, 3);

    let engine = QueryEngine::new(&store, &embedder);
    let opts = QueryOptions {
        limit: 5,
        threshold: 0.5,
        repo: None,
    };

    let outcome = engine.query("rust cargo crates", &opts).await.unwrap();
    let QueryOutcome::Found(results) = outcome else {
        panic!("expected results");
    };
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source_path, "alpha.md");
    assert_eq!(results[0].context, "Alpha");

    let loose = QueryOptions {
        threshold: 0.0,
        ..opts.clone()
    };
    let all = engine.query("rust cargo crates", &loose).await.unwrap();
    let sims: Vec<f64> = all.results().iter().map(|r| r.similarity).collect();
    assert_eq!(sims.len(), 5);
    assert!(sims.windows(2).all(|w| w[0] >= w[1]));

    let strict = QueryOptions {
        threshold: 0.9,
        ..opts.clone()
    };
    let none = engine.query("rust cargo crates", &strict).await.unwrap();
    assert!(matches!(none, QueryOutcome::NotFound));

    let other_repo = QueryOptions {
        repo: Some("elsewhere".to_string()),
        ..opts
    };
    let filtered = engine.query("rust cargo crates", &other_repo).await.unwrap();
    assert!(!filtered.is_found());
}

#[tokio::test]
async fn test_sqlite_unchanged_skip_and_prune() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    write_corpus(&root);
    let cfg = config(&tmp, "");
    let store = open_sqlite(&tmp).await;
    let provider = BagOfWords::default();
    let embedder = embedder(&provider);

    run(&cfg, &store, &embedder, IndexOptions::default()).await;
    let unchanged = run(&cfg, &store, &embedder, IndexOptions::default()).await;
    assert_eq!(unchanged.files_indexed, 0);
    assert_eq!(unchanged.files_skipped, 3);

    fs::remove_file(root.join("gamma.txt")).unwrap();
    let pruned = run(&cfg, &store, &embedder, IndexOptions::default()).await;
    assert_eq!(pruned.files_removed, 1);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].documents, 2);
    assert_eq!(stats[0].chunks, 3);
}

#[tokio::test]
async fn test_query_empty_store_is_not_found() {
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();
    let embedder = embedder(&provider);

    let outcome = QueryEngine::new(&store, &embedder)
        .query(
            "anything at all",
            &QueryOptions {
                limit: 5,
                threshold: 0.7,
                repo: None,
            },
        )
        .await
        .unwrap();
    assert!(matches!(outcome, QueryOutcome::NotFound));
}

#[tokio::test]
async fn test_incremental_without_git_falls_back_to_full_scan() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    write_corpus(&root);
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();
    let incremental = IndexOptions {
        incremental: true,
        ..IndexOptions::default()
    };

    run(&cfg, &store, &embedder(&provider), incremental.clone()).await;
    fs::write(root.join("beta.md"), "# Beta\n\nPython, updated.").unwrap();

    let report = run(&cfg, &store, &embedder(&provider), incremental).await;
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.files_skipped, 2);
}

fn git(root: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=kb",
            "-c",
            "user.email=kb@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(root)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Turn `root` into a git repo with everything committed. Returns false
/// when git is not installed.
fn commit_corpus(root: &Path) -> bool {
    if Command::new("git").arg("--version").output().is_err() {
        return false;
    }
    git(root, &["init", "-q"]);
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", "initial"]);
    true
}

fn incremental() -> IndexOptions {
    IndexOptions {
        incremental: true,
        ..IndexOptions::default()
    }
}

#[tokio::test]
async fn test_incremental_git_visits_only_changed_files() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    write_corpus(&root);
    if !commit_corpus(&root) {
        return;
    }
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    let first = run(&cfg, &store, &embedder(&provider), incremental()).await;
    assert_eq!(first.files_indexed, 3);

    fs::write(root.join("beta.md"), "# Beta\n\nPython, updated.").unwrap();
    fs::write(root.join("delta.md"), "# Delta\n\nA brand new note.").unwrap();
    let second = run(&cfg, &store, &embedder(&provider), incremental()).await;
    assert_eq!(second.files_indexed, 2);
    assert_eq!(second.files_skipped, 0);
    assert!(snapshot(&store, "delta.md")
        .await
        .iter()
        .any(|(_, text, _)| text.contains("brand new")));

    git(&root, &["add", "-A"]);
    git(&root, &["commit", "-q", "-m", "update"]);
    fs::write(root.join("alpha.md"), "# Alpha\n\nRewritten.").unwrap();
    git(&root, &["commit", "-q", "-am", "alpha"]);

    // beta and delta show up in the committed diff but are unchanged.
    let third = run(&cfg, &store, &embedder(&provider), incremental()).await;
    assert_eq!(third.files_indexed, 1);
    assert_eq!(third.files_skipped, 2);
    assert_eq!(
        snapshot(&store, "alpha.md").await,
        vec![(0, "Rewritten.".to_string(), "Alpha".to_string())]
    );
}

#[tokio::test]
async fn test_incremental_git_handles_non_ascii_paths() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("café.md"), "# Café\n\nold body").unwrap();
    fs::write(root.join("keep.md"), "# Keep\n\nstays put").unwrap();
    if !commit_corpus(&root) {
        return;
    }
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    run(&cfg, &store, &embedder(&provider), incremental()).await;

    fs::write(root.join("café.md"), "# Café\n\nNEW body").unwrap();
    let modified = run(&cfg, &store, &embedder(&provider), incremental()).await;
    assert_eq!(modified.files_indexed, 1);
    let texts: Vec<String> = snapshot(&store, "café.md")
        .await
        .into_iter()
        .map(|(_, text, _)| text)
        .collect();
    assert_eq!(texts, vec!["NEW body"]);

    fs::remove_file(root.join("café.md")).unwrap();
    let deleted = run(&cfg, &store, &embedder(&provider), incremental()).await;
    assert_eq!(deleted.files_removed, 1);
    assert_eq!(deleted.deleted_paths, vec!["café.md"]);
    assert_eq!(store.list_paths("handbook").await.unwrap(), vec!["keep.md"]);
}

#[tokio::test]
async fn test_incremental_git_prunes_deleted_untracked_file() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("corpus");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("keep.md"), "# Keep\n\nstays put").unwrap();
    if !commit_corpus(&root) {
        return;
    }
    let cfg = config(&tmp, "");
    let store = InMemoryStore::new();
    let provider = BagOfWords::default();

    fs::write(root.join("scratch.md"), "# Scratch\n\nnever committed").unwrap();
    run(&cfg, &store, &embedder(&provider), incremental()).await;
    let again = run(&cfg, &store, &embedder(&provider), incremental()).await;
    assert_eq!(again.files_skipped, 1);
    assert_eq!(
        store.list_paths("handbook").await.unwrap(),
        vec!["keep.md", "scratch.md"]
    );

    fs::remove_file(root.join("scratch.md")).unwrap();
    let report = run(&cfg, &store, &embedder(&provider), incremental()).await;
    assert_eq!(report.files_removed, 1);
    assert_eq!(store.list_paths("handbook").await.unwrap(), vec!["keep.md"]);
}
