//! Query engine: embed a question, search the store, format the answer.
//!
//! "Nothing relevant" and "the query failed" are different outcomes:
//! the former is `Ok(QueryOutcome::NotFound)`, the latter an `Err`.
//!
//! Three output formats are supported:
//!
//! | Format | Audience |
//! |--------|----------|
//! | `json` | machines; `{ query, found, results: [...] }` |
//! | `text` | humans; ranked list with `[NN%]` similarity |
//! | `context` | prompts; a `<retrieved_context>` block with one attributed section per result |

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fmt::Write as _;

use crate::config::{Config, RetrievalConfig};
use crate::embedding::Embedder;
use crate::models::QueryResult;
use crate::store::sqlite::SqliteStore;
use crate::store::{SearchOptions, Store};

const NOT_FOUND_MESSAGE: &str = "No relevant knowledge found.";

/// Result of a query that did not fail.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Found(Vec<QueryResult>),
    NotFound,
}

impl QueryOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, QueryOutcome::Found(_))
    }

    pub fn results(&self) -> &[QueryResult] {
        match self {
            QueryOutcome::Found(results) => results,
            QueryOutcome::NotFound => &[],
        }
    }
}

/// Per-query knobs; defaults come from `[retrieval]`.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub limit: usize,
    pub threshold: f64,
    pub repo: Option<String>,
}

impl QueryOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            limit: config.limit,
            threshold: config.threshold,
            repo: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            bail!("limit must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            bail!("threshold must be between 0.0 and 1.0, got {}", self.threshold);
        }
        Ok(())
    }
}

/// Output format for `kb query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
    Context,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            "context" => Ok(OutputFormat::Context),
            other => bail!("Unknown output format: {}. Use json, text, or context.", other),
        }
    }
}

pub struct QueryEngine<'a, S: Store> {
    store: &'a S,
    embedder: &'a Embedder,
}

impl<'a, S: Store> QueryEngine<'a, S> {
    pub fn new(store: &'a S, embedder: &'a Embedder) -> Self {
        Self { store, embedder }
    }

    pub async fn query(&self, text: &str, opts: &QueryOptions) -> Result<QueryOutcome> {
        if text.trim().is_empty() {
            return Ok(QueryOutcome::NotFound);
        }
        opts.validate()?;

        let embedding = self
            .embedder
            .embed(text)
            .await
            .context("Failed to embed query")?;

        let search = SearchOptions {
            limit: opts.limit,
            threshold: opts.threshold,
            repo: opts.repo.clone(),
        };
        let results = self
            .store
            .search(&embedding.vector, &search)
            .await
            .context("Store search failed")?;

        if results.is_empty() {
            Ok(QueryOutcome::NotFound)
        } else {
            Ok(QueryOutcome::Found(results))
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    found: bool,
    results: &'a [QueryResult],
}

pub fn render(query: &str, outcome: &QueryOutcome, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => render_json(query, outcome),
        OutputFormat::Text => Ok(render_text(outcome)),
        OutputFormat::Context => Ok(render_context(query, outcome)),
    }
}

pub fn render_json(query: &str, outcome: &QueryOutcome) -> Result<String> {
    let output = JsonOutput {
        query,
        found: outcome.is_found(),
        results: outcome.results(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

pub fn render_text(outcome: &QueryOutcome) -> String {
    let results = match outcome {
        QueryOutcome::NotFound => return NOT_FOUND_MESSAGE.to_string(),
        QueryOutcome::Found(results) => results,
    };

    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. [{}] {}/{} ({})",
            i + 1,
            percent(r.similarity),
            r.source_repo,
            r.source_path,
            r.chunk_type
        );
        if !r.context.is_empty() {
            let _ = writeln!(out, "    section: {}", r.context);
        }
        let _ = writeln!(out, "    {}", r.text.replace('\n', " ").trim());
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn render_context(query: &str, outcome: &QueryOutcome) -> String {
    let mut out = format!("<retrieved_context query=\"{}\">\n", escape_attr(query));
    match outcome {
        QueryOutcome::NotFound => {
            out.push_str(NOT_FOUND_MESSAGE);
            out.push('\n');
        }
        QueryOutcome::Found(results) => {
            for r in results {
                let _ = writeln!(
                    out,
                    "<source repo=\"{}\" path=\"{}\" section=\"{}\" similarity=\"{:.2}\">",
                    escape_attr(&r.source_repo),
                    escape_attr(&r.source_path),
                    escape_attr(&r.context),
                    r.similarity
                );
                out.push_str(r.text.trim_end());
                out.push_str("\n</source>\n");
            }
        }
    }
    out.push_str("</retrieved_context>");
    out
}

fn percent(similarity: f64) -> String {
    format!("{}%", (similarity * 100.0).round() as i64)
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `kb query`: answer one query against the configured database and print it.
pub async fn run_query(
    config: &Config,
    text: &str,
    opts: &QueryOptions,
    format: OutputFormat,
) -> Result<QueryOutcome> {
    let outcome = if text.trim().is_empty() {
        QueryOutcome::NotFound
    } else {
        if !config.embedding.is_enabled() {
            bail!("Querying requires embeddings. Set [embedding] provider in config.");
        }
        let store = SqliteStore::open(config).await?;
        let embedder = Embedder::from_config(&config.embedding)?;
        let outcome = QueryEngine::new(&store, &embedder).query(text, opts).await?;
        store.pool().close().await;
        outcome
    };

    println!("{}", render(text, &outcome, format)?);
    Ok(outcome)
}
