use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::index::Distance;

/// Upload size ceiling. Larger documents are rejected before extraction.
pub const MAX_DOCUMENT_BYTES: u64 = 200 * 1024 * 1024;

/// Target chunk length in characters.
pub const CHUNK_SIZE_CHARS: usize = 1000;

/// Characters shared between adjacent chunks of the same page.
pub const CHUNK_OVERLAP_CHARS: usize = 250;

/// Number of chunks retrieved as grounding context for one question.
pub const DEFAULT_TOP_K: usize = 4;

/// Default local embedding model (fastembed model code).
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// Vector width produced by the hashing embedder unless configured otherwise.
/// Matches BGE-small-en-v1.5 so both backends can share a collection schema.
pub const HASHING_DIMENSION: usize = 384;

/// Number of texts sent to the embedding backend per call.
pub const EMBED_BATCH_SIZE: usize = 32;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_COLLECTION: &str = "vector_db";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

pub const EMBEDDING_TIMEOUT_SECS: u64 = 60;
pub const LLM_TIMEOUT_SECS: u64 = 120;
pub const INDEX_TIMEOUT_SECS: u64 = 10;

/// How long a question waits for an in-flight ingestion before giving up
/// with `NotReady`.
pub const READY_TIMEOUT_SECS: u64 = 30;

/// Retries per vector store request after the first attempt.
pub const INDEX_MAX_RETRIES: usize = 3;

/// Settings file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "doctalk.toml";

/// Effective runtime configuration.
///
/// Every field has a default, so a settings file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub max_document_bytes: u64,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkingSettings {
    pub size: usize,
    pub overlap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Fastembed,
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub normalize: bool,
    pub batch_size: usize,
    /// Vector width of the hashing backend. Ignored by fastembed, whose
    /// width is fixed by the model.
    pub dimension: usize,
    /// Where fastembed keeps downloaded model files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Qdrant,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    pub url: String,
    /// Database file for the sqlite backend. `:memory:` keeps it in RAM.
    pub sqlite_path: PathBuf,
    pub collection: String,
    pub distance: Distance,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSettings {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub ready_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_document_bytes: MAX_DOCUMENT_BYTES,
            chunking: ChunkingSettings::default(),
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            size: CHUNK_SIZE_CHARS,
            overlap: CHUNK_OVERLAP_CHARS,
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Fastembed,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            normalize: true,
            batch_size: EMBED_BATCH_SIZE,
            dimension: HASHING_DIMENSION,
            cache_dir: None,
            timeout_secs: EMBEDDING_TIMEOUT_SECS,
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Qdrant,
            url: DEFAULT_QDRANT_URL.to_string(),
            sqlite_path: PathBuf::from("doctalk.db"),
            collection: DEFAULT_COLLECTION.to_string(),
            distance: Distance::Cosine,
            timeout_secs: INDEX_TIMEOUT_SECS,
            max_retries: INDEX_MAX_RETRIES,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            seed: None,
            timeout_secs: LLM_TIMEOUT_SECS,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            ready_timeout_secs: READY_TIMEOUT_SECS,
        }
    }
}

impl EmbeddingSettings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Model cache directory, defaulting to `~/.doctalk/models`.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".doctalk")
                .join("models")
        })
    }
}

impl IndexSettings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LlmSettings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RetrievalSettings {
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

impl Settings {
    /// Load settings from `path`, or from `./doctalk.toml` when it exists,
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `DOCTALK_*` overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DOCTALK_QDRANT_URL") {
            self.index.url = url;
        }
        if let Some(collection) = lookup("DOCTALK_COLLECTION") {
            self.index.collection = collection;
        }
        if let Some(url) = lookup("DOCTALK_OLLAMA_URL") {
            self.llm.url = url;
        }
        if let Some(model) = lookup("DOCTALK_LLM_MODEL") {
            self.llm.model = model;
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.chunking.size > 0, "chunking.size must be greater than zero");
        anyhow::ensure!(
            self.chunking.overlap < self.chunking.size,
            "chunking.overlap ({}) must be smaller than chunking.size ({})",
            self.chunking.overlap,
            self.chunking.size
        );
        anyhow::ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be greater than zero");
        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be greater than zero"
        );
        anyhow::ensure!(
            self.embedding.dimension > 0,
            "embedding.dimension must be greater than zero"
        );
        anyhow::ensure!(
            (0.0..=2.0).contains(&self.llm.temperature),
            "llm.temperature must be within [0, 2], got {}",
            self.llm.temperature
        );
        anyhow::ensure!(
            !self.index.collection.trim().is_empty(),
            "index.collection must not be empty"
        );
        ensure_http_url("llm.url", &self.llm.url)?;
        if self.index.backend == IndexBackend::Qdrant {
            ensure_http_url("index.url", &self.index.url)?;
        }
        Ok(())
    }
}

fn ensure_http_url(key: &str, url: &str) -> anyhow::Result<()> {
    anyhow::ensure!(
        url.starts_with("http://") || url.starts_with("https://"),
        "{key} must be an http(s) URL, got {url:?}"
    );
    Ok(())
}
