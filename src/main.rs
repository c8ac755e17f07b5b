//! # Knowledge Harness CLI (`kb`)
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the SQLite database and run schema migrations |
//! | `kb index` | Index new and changed corpus files |
//! | `kb query "<text>"` | Retrieve the most relevant chunks |
//! | `kb stats` | Show per-repo document and chunk counts |
//!
//! Logs go to stderr and are filtered with `KB_LOG` (default `info`), so
//! `kb query --format json` output on stdout stays machine-readable.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use knowledge_harness::config;
use knowledge_harness::index::{self, IndexOptions};
use knowledge_harness::query::{self, OutputFormat, QueryOptions};
use knowledge_harness::{db, migrate, stats};

/// Knowledge Harness CLI: index a directory of documents and query it
/// by semantic similarity.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Knowledge Harness: a local-first knowledge ingestion and retrieval pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Index the corpus.
    ///
    /// Unchanged files (same content fingerprint) are skipped unless
    /// `--full` is given. Exits non-zero when any file failed.
    Index {
        /// Re-index every file regardless of its fingerprint.
        #[arg(long)]
        full: bool,

        /// Only visit files changed since the last indexed git revision.
        #[arg(long, conflicts_with = "full")]
        incremental: bool,

        /// Repo label stored on every chunk (defaults to `corpus.repo`).
        #[arg(long)]
        repo: Option<String>,
    },

    /// Query the index.
    ///
    /// Exits 0 whether or not anything relevant was found; non-zero only
    /// when the query itself failed.
    Query {
        /// The question or search text.
        text: String,

        /// Maximum number of results (defaults to `retrieval.limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity in [0, 1] (defaults to `retrieval.threshold`).
        #[arg(long)]
        threshold: Option<f64>,

        /// Only search chunks from this repo.
        #[arg(long)]
        repo: Option<String>,

        /// Output format: `json`, `text`, or `context`.
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show index statistics.
    Stats,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KB_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            full,
            incremental,
            repo,
        } => {
            let opts = IndexOptions {
                full_reindex: full,
                incremental,
                repo_label: repo,
            };
            let report = index::run_index(&cfg, &opts).await?;
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Commands::Query {
            text,
            limit,
            threshold,
            repo,
            format,
        } => {
            let format = OutputFormat::parse(&format)?;
            let mut opts = QueryOptions::from_config(&cfg.retrieval);
            if let Some(limit) = limit {
                opts.limit = limit;
            }
            if let Some(threshold) = threshold {
                opts.threshold = threshold;
            }
            opts.repo = repo;
            query::run_query(&cfg, &text, &opts, format).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
