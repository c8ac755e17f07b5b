//! Heading-aware recursive text chunker.
//!
//! Splits extracted document text into an ordered list of [`RawChunk`]s,
//! each annotated with the heading breadcrumb that was active where it
//! appeared.
//!
//! # Algorithm
//!
//! 1. Scan lines and cut the document at every markdown heading
//!    (`#` to `######` followed by a space and a title). Each segment keeps
//!    its own heading; text before the first heading forms a headless
//!    leading segment. Lines inside fenced code blocks are never headings.
//! 2. If no heading was found, the document is split on blank-line
//!    paragraphs instead.
//! 3. A level-keyed map tracks the active headings. Setting level `n`
//!    drops every recorded level deeper than `n`. The breadcrumb is the
//!    active titles in ascending level order joined by `" > "`.
//! 4. A segment body up to `max_chars` becomes one chunk. Longer bodies are
//!    split on paragraphs; a paragraph still over `max_chars` is split into
//!    sentences that are greedily packed up to `pack_chars`. A sentence is
//!    never divided.
//! 5. Whitespace-only pieces are dropped without consuming an index.
//!
//! Lengths are measured in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use knowledge_harness::chunk::{chunk_document, ChunkerOptions};
//! use knowledge_harness::models::{ChunkType, DocumentKind};
//!
//! let text = "# Title\n\nHello world.\n\n## Sub\n\nMore text.";
//! let chunks = chunk_document(text, DocumentKind::Markdown, &ChunkerOptions::default());
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].context, "Title > Sub");
//! assert_eq!(chunks[1].chunk_type, ChunkType::Heading);
//! ```

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::config::ChunkingConfig;
use crate::models::{ChunkType, DocumentKind, RawChunk};

/// Separator between breadcrumb levels.
pub const CONTEXT_SEPARATOR: &str = " > ";

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})[ \t]+(.*?)(?:[ \t]+#+)?[ \t]*$").expect("heading pattern is valid")
});

/// Size limits for the chunker.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerOptions {
    /// Bodies and paragraphs up to this many characters are kept whole.
    pub max_chars: usize,
    /// Target size when packing sentences from an oversized paragraph.
    pub pack_chars: usize,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            max_chars: 1500,
            pack_chars: 1200,
        }
    }
}

impl From<&ChunkingConfig> for ChunkerOptions {
    fn from(cfg: &ChunkingConfig) -> Self {
        Self {
            max_chars: cfg.max_chars,
            pack_chars: cfg.pack_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Heading {
    level: usize,
    title: String,
}

#[derive(Debug)]
struct Segment {
    heading: Option<Heading>,
    body: String,
}

/// Split `text` into ordered chunks. Indices start at 0 and are contiguous.
///
/// Empty or whitespace-only input yields an empty list.
pub fn chunk_document(text: &str, kind: DocumentKind, opts: &ChunkerOptions) -> Vec<RawChunk> {
    let mut out = ChunkSink::default();
    if text.trim().is_empty() {
        return out.chunks;
    }

    let segments = split_segments(text);
    let has_headings = segments.iter().any(|s| s.heading.is_some());

    if !has_headings {
        let base = if kind == DocumentKind::PdfExtracted {
            ChunkType::PdfSection
        } else {
            ChunkType::Paragraph
        };
        for para in split_paragraphs(text) {
            emit_piece(&mut out, &para, base, "", opts);
        }
        return out.chunks;
    }

    let mut hierarchy: BTreeMap<usize, String> = BTreeMap::new();

    for segment in segments {
        let base = match &segment.heading {
            Some(h) => {
                hierarchy.retain(|level, _| *level < h.level);
                hierarchy.insert(h.level, h.title.clone());
                ChunkType::Heading
            }
            None => ChunkType::Paragraph,
        };
        let context = render_context(&hierarchy);

        let body = segment.body.trim();
        if body.is_empty() {
            continue;
        }

        if char_len(body) <= opts.max_chars {
            out.push(base, body, &context);
            continue;
        }

        for para in split_paragraphs(body) {
            emit_piece(&mut out, &para, base, &context, opts);
        }
    }

    out.chunks
}

/// Convenience wrapper taking the configured sizes.
pub fn chunk_with_config(text: &str, kind: DocumentKind, cfg: &ChunkingConfig) -> Vec<RawChunk> {
    chunk_document(text, kind, &ChunkerOptions::from(cfg))
}

#[derive(Default)]
struct ChunkSink {
    chunks: Vec<RawChunk>,
}

impl ChunkSink {
    fn push(&mut self, chunk_type: ChunkType, text: &str, context: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.chunks.push(RawChunk {
            chunk_index: self.chunks.len() as i64,
            chunk_type,
            text: text.to_string(),
            context: context.to_string(),
        });
    }
}

/// Emit one paragraph, packing sentences when it is oversized.
fn emit_piece(out: &mut ChunkSink, para: &str, base: ChunkType, context: &str, opts: &ChunkerOptions) {
    let fenced = is_fenced_block(para);
    let chunk_type = if fenced { ChunkType::Code } else { base };

    if char_len(para) <= opts.max_chars {
        out.push(chunk_type, para, context);
        return;
    }

    let packed = if fenced {
        // No sentence structure in code; pack whole lines instead.
        pack(para.lines().collect(), "\n", opts.pack_chars)
    } else {
        pack(split_sentences(para), " ", opts.pack_chars)
    };
    for piece in packed {
        out.push(chunk_type, &piece, context);
    }
}

/// Cut the document into heading-led segments, ignoring `#` inside fences.
fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = Segment {
        heading: None,
        body: String::new(),
    };
    let mut fence: Option<&'static str> = None;

    for line in text.lines() {
        if let Some(marker) = fence {
            if closes_fence(line, marker) {
                fence = None;
            }
            push_line(&mut current.body, line);
            continue;
        }
        if let Some(marker) = fence_marker(line) {
            fence = Some(marker);
            push_line(&mut current.body, line);
            continue;
        }
        if let Some(heading) = parse_heading(line) {
            let next = Segment {
                heading: Some(heading),
                body: String::new(),
            };
            segments.push(std::mem::replace(&mut current, next));
            continue;
        }
        push_line(&mut current.body, line);
    }
    segments.push(current);
    segments
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

fn parse_heading(line: &str) -> Option<Heading> {
    let caps = HEADING_RE.captures(line)?;
    let level = caps.get(1)?.as_str().len();
    let title = caps.get(2)?.as_str().trim();
    if title.is_empty() {
        return None;
    }
    Some(Heading {
        level,
        title: title.to_string(),
    })
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

/// A closing fence is the marker character alone, at least as long as the
/// opener. A line like ```` ```rust ```` opens a block but never closes one.
fn closes_fence(line: &str, marker: &str) -> bool {
    let trimmed = line.trim();
    let Some(fence_char) = marker.chars().next() else {
        return false;
    };
    trimmed.len() >= marker.len() && trimmed.chars().all(|c| c == fence_char)
}

fn is_fenced_block(para: &str) -> bool {
    let lines: Vec<&str> = para.lines().collect();
    if lines.len() < 2 {
        return false;
    }
    match fence_marker(lines[0]) {
        Some(marker) => closes_fence(lines[lines.len() - 1], marker),
        None => false,
    }
}

fn render_context(hierarchy: &BTreeMap<usize, String>) -> String {
    hierarchy
        .values()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Split on blank lines. A fenced code block is one unit even if it
/// contains blank lines.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut fence: Option<&'static str> = None;

    for line in text.lines() {
        if let Some(marker) = fence {
            current.push(line);
            if closes_fence(line, marker) {
                fence = None;
            }
            continue;
        }
        if let Some(marker) = fence_marker(line) {
            fence = Some(marker);
            current.push(line);
            continue;
        }
        if line.trim().is_empty() {
            flush_paragraph(&mut paragraphs, &mut current);
            continue;
        }
        current.push(line);
    }
    flush_paragraph(&mut paragraphs, &mut current);

    paragraphs
}

fn flush_paragraph(paragraphs: &mut Vec<String>, current: &mut Vec<&str>) {
    if current.is_empty() {
        return;
    }
    let joined = current.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        paragraphs.push(trimmed.to_string());
    }
    current.clear();
}

/// Split into sentences. A boundary is whitespace that follows `.`, `!`, or `?`.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            let sentence = text[start..i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = i;
        }
        prev = Some(c);
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Greedily join units up to `limit` characters. Units are never split;
/// one longer than `limit` is emitted alone.
fn pack(units: Vec<&str>, joiner: &str, limit: usize) -> Vec<String> {
    let mut packed = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;
    let joiner_len = char_len(joiner);

    for unit in units {
        let unit_len = char_len(unit);
        if !buf.is_empty() && buf_len + joiner_len + unit_len > limit {
            packed.push(std::mem::take(&mut buf));
            buf_len = 0;
        }
        if !buf.is_empty() {
            buf.push_str(joiner);
            buf_len += joiner_len;
        }
        buf.push_str(unit);
        buf_len += unit_len;
    }
    if !buf.trim().is_empty() {
        packed.push(buf);
    }

    packed
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
