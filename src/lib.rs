//! # Knowledge Harness
//!
//! A local-first knowledge ingestion and retrieval pipeline.
//!
//! Knowledge Harness walks a directory of markdown, text, PDF, and CSV
//! files, splits each document into heading-aware chunks, embeds every
//! chunk through an external embedding service, and stores the vectors in
//! SQLite. Questions are answered by embedding the question and returning
//! the most similar chunks above a threshold.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌──────────┐
//! │  Corpus  │──▶│  Hash → Chunk → Embed │──▶│  SQLite  │
//! │ md/pdf/… │   │       (Indexer)       │   │  chunks  │
//! └──────────┘   └──────────────────────┘   └────┬─────┘
//!                                                │
//!                                         ┌──────▼──────┐
//!                                         │ QueryEngine │
//!                                         │  (kb query) │
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kb init                                # create database
//! kb index                               # index changed files
//! kb index --incremental                 # only files changed since last run
//! kb query "how do I deploy" --format context
//! kb stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`hashing`] | Content fingerprints and change detection |
//! | [`corpus`] | Corpus discovery with include/exclude globs |
//! | [`extract`] | PDF and CSV to text |
//! | [`chunk`] | Heading-aware chunking |
//! | [`embedding`] | Embedding providers and the truncating [`embedding::Embedder`] |
//! | [`store`] | Storage trait with SQLite and in-memory backends |
//! | [`index`] | Indexing pipeline |
//! | [`query`] | Query engine and output formats |
//! | [`revision`] | Git revision markers and change sets |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod hashing;
pub mod index;
pub mod migrate;
pub mod models;
pub mod query;
pub mod revision;
pub mod stats;
pub mod store;
