//! TOML configuration parsing and validation.
//!
//! The configuration is loaded once at process start and passed by
//! reference into every component. Secrets named by the config (the
//! embedding API key) are resolved here, so nothing downstream reads the
//! process environment.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/kb.sqlite"
//!
//! [corpus]
//! root = "./docs"
//! repo = "handbook"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    /// Label stored with every chunk. Defaults to the root directory name.
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.markdown".to_string(),
        "**/*.txt".to_string(),
        "**/*.pdf".to_string(),
        "**/*.csv".to_string(),
    ]
}

impl CorpusConfig {
    /// The configured repo label, or the corpus root's directory name.
    pub fn repo_label(&self) -> String {
        if let Some(repo) = &self.repo {
            return repo.clone();
        }
        self.root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone())
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "default".to_string())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_pack_chars")]
    pub pack_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            pack_chars: default_pack_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1500
}
fn default_pack_chars() -> usize {
    1200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Service endpoint. Defaults per provider.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Inputs longer than this many characters are truncated before sending.
    #[serde(default = "default_embed_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Resolved from `api_key_env` by [`load_config`].
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: None,
            api_key_env: default_api_key_env(),
            max_chars: default_embed_max_chars(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_embed_max_chars() -> usize {
    30_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            threshold: default_threshold(),
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_threshold() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Remove chunks whose source file disappeared from the corpus.
    #[serde(default = "default_prune_deleted")]
    pub prune_deleted: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            prune_deleted: default_prune_deleted(),
        }
    }
}

fn default_prune_deleted() -> bool {
    true
}

impl Config {
    /// Parse and validate a TOML document without touching the environment.
    ///
    /// The API key is left unset; callers that need it use [`load_config`]
    /// or set `embedding.api_key` themselves.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunking.max_chars == 0 || self.chunking.pack_chars == 0 {
            bail!("chunking.max_chars and chunking.pack_chars must be > 0");
        }
        if self.chunking.pack_chars > self.chunking.max_chars {
            bail!("chunking.pack_chars must be <= chunking.max_chars");
        }

        if self.retrieval.limit < 1 {
            bail!("retrieval.limit must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.retrieval.threshold) {
            bail!("retrieval.threshold must be in [0.0, 1.0]");
        }

        if self.embedding.max_chars == 0 {
            bail!("embedding.max_chars must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }

        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        Ok(())
    }
}

/// Read, parse, and validate the config file, then resolve secrets.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = Config::from_toml_str(&content)?;

    if config.embedding.provider == "openai" {
        let key = std::env::var(&config.embedding.api_key_env).ok();
        match key {
            Some(k) if !k.trim().is_empty() => config.embedding.api_key = Some(k),
            _ => bail!(
                "{} environment variable not set (required by embedding provider 'openai')",
                config.embedding.api_key_env
            ),
        }
    }

    Ok(config)
}
