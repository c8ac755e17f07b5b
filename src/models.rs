//! Core data models used throughout the knowledge harness.
//!
//! These types represent the documents, chunks, and query results that flow
//! through the ingestion and retrieval pipeline. A [`Chunk`] is passed by
//! ownership from the chunker through the embedder into the store; nothing
//! between those stages is serialized.

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// The shape of a source document, decided once when the file is discovered.
///
/// The chunker reads this instead of re-sniffing the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Markdown,
    PlainText,
    PdfExtracted,
    CsvConverted,
}

impl DocumentKind {
    /// Classify a file by its extension. Unknown extensions are plain text.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "md" | "markdown" | "mdx" => DocumentKind::Markdown,
            "pdf" => DocumentKind::PdfExtracted,
            "csv" => DocumentKind::CsvConverted,
            _ => DocumentKind::PlainText,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Markdown => "markdown",
            DocumentKind::PlainText => "plain_text",
            DocumentKind::PdfExtracted => "pdf_extracted",
            DocumentKind::CsvConverted => "csv_converted",
        }
    }
}

/// The structural role of a chunk within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Heading,
    Paragraph,
    Code,
    PdfSection,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Heading => "heading",
            ChunkType::Paragraph => "paragraph",
            ChunkType::Code => "code",
            ChunkType::PdfSection => "pdf_section",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "heading" => Some(ChunkType::Heading),
            "paragraph" => Some(ChunkType::Paragraph),
            "code" => Some(ChunkType::Code),
            "pdf_section" => Some(ChunkType::PdfSection),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file discovered in the corpus, before extraction and chunking.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub source_repo: String,
    /// Path relative to the corpus root, with `/` separators.
    pub source_path: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

/// A chunk produced by the chunker, not yet embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub chunk_index: i64,
    pub chunk_type: ChunkType,
    pub text: String,
    /// Heading breadcrumb, e.g. `"Intro > Setup"`. Empty when no heading is active.
    pub context: String,
}

/// The atomic indexed unit.
///
/// `(source_repo, source_path, chunk_index)` identifies a chunk; writing a
/// second chunk with the same key replaces the first entirely.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub source_repo: String,
    pub source_path: String,
    /// Fingerprint of the parent document when this chunk was produced.
    pub source_hash: String,
    pub chunk_index: i64,
    pub chunk_type: ChunkType,
    pub text: String,
    pub context: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A single ranked hit returned from a similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub source_repo: String,
    pub source_path: String,
    pub chunk_index: i64,
    pub chunk_type: ChunkType,
    pub context: String,
    pub text: String,
    /// Cosine similarity clamped to `[0, 1]`; higher is better.
    pub similarity: f64,
}

/// Persisted cursor recording the last indexed corpus revision for a repo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexState {
    pub source_repo: String,
    pub revision: String,
    pub updated_at: i64,
}

/// Counters and outcomes of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub files_removed: u64,
    pub chunks_written: u64,
    pub chunks_failed: u64,
    pub truncated_chunks: u64,
    pub deleted_paths: Vec<String>,
    pub failures: Vec<FileFailure>,
    pub revision: Option<String>,
}

impl IndexReport {
    /// True when at least one file could not be indexed.
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0
    }
}

/// A file that could not be indexed, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub source_path: String,
    pub reason: String,
}
