//! Corpus discovery.
//!
//! Walks the configured corpus root and applies include/exclude globs.
//! Each file is loaded as a [`SourceDocument`] with its raw bytes and its
//! [`DocumentKind`] decided once from the extension.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::models::{DocumentKind, SourceDocument};

/// Directories that are never part of a corpus.
const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Compiled include/exclude filters for a corpus.
pub struct CorpusFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl CorpusFilter {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(config.exclude_globs.iter().cloned());
        Ok(Self {
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
        })
    }

    /// Whether a root-relative path belongs to the corpus.
    pub fn matches(&self, relative_path: &str) -> bool {
        !self.exclude.is_match(relative_path) && self.include.is_match(relative_path)
    }
}

/// All corpus-relative paths, without reading file contents.
pub fn list_paths(config: &CorpusConfig) -> Result<Vec<String>> {
    let root = &config.root;
    if !root.is_dir() {
        bail!("Corpus root does not exist: {}", root.display());
    }
    let filter = CorpusFilter::new(config)?;
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let rel = relative_path(root, entry.path());
            if filter.matches(&rel) {
                paths.push(rel);
            }
        }
    }
    paths.sort();
    Ok(paths)
}

/// Load a single file by its root-relative path.
pub fn read_relative(config: &CorpusConfig, rel: &str, repo: &str) -> Result<SourceDocument> {
    read_document(&config.root.join(rel), rel, repo)
}

fn read_document(path: &Path, rel: &str, repo: &str) -> Result<SourceDocument> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(SourceDocument {
        source_repo: repo.to_string(),
        source_path: rel.to_string(),
        kind: DocumentKind::from_path(path),
        bytes,
    })
}

/// Root-relative path with `/` separators on every platform.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
