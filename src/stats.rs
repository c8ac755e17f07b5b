//! Index statistics.
//!
//! A quick summary of what's indexed: document and chunk counts per repo,
//! the last indexed revision, and when files were last written. Used by
//! `kb stats` to confirm that indexing runs are landing.

use anyhow::Result;

use crate::config::Config;
use crate::store::sqlite::SqliteStore;
use crate::store::{RepoStats, Store};

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let repos = store.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    print!("{}", render_stats(&config.db.path.display().to_string(), db_size, &repos));

    store.pool().close().await;
    Ok(())
}

fn render_stats(db_path: &str, db_size: u64, repos: &[RepoStats]) -> String {
    let total_docs: i64 = repos.iter().map(|r| r.documents).sum();
    let total_chunks: i64 = repos.iter().map(|r| r.chunks).sum();

    let mut lines = vec![
        "Knowledge Harness: Index Stats".to_string(),
        "==============================".to_string(),
        String::new(),
        format!("  Database:    {}", db_path),
        format!("  Size:        {}", format_bytes(db_size)),
        String::new(),
        format!("  Documents:   {}", total_docs),
        format!("  Chunks:      {}", total_chunks),
    ];

    if !repos.is_empty() {
        lines.push(String::new());
        lines.push("  By repo:".to_string());
        lines.push(format!(
            "  {:<20} {:>6} {:>8}   {:<14} {}",
            "REPO", "DOCS", "CHUNKS", "REVISION", "LAST INDEXED"
        ));
        lines.push(format!("  {}", "-".repeat(72)));

        for r in repos {
            let revision = r
                .revision
                .as_deref()
                .map(short_revision)
                .unwrap_or("never");
            let indexed = match r.last_indexed_at {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            lines.push(format!(
                "  {:<20} {:>6} {:>8}   {:<14} {}",
                r.source_repo, r.documents, r.chunks, revision, indexed
            ));
        }
    }

    lines.push(String::new());
    lines.join("\n") + "\n"
}

/// Git SHAs are shortened; timestamps are shown as-is.
fn short_revision(rev: &str) -> &str {
    if rev.len() == 40 && rev.chars().all(|c| c.is_ascii_hexdigit()) {
        &rev[..12]
    } else {
        rev
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
