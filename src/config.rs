use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chunker::Chunker;
use crate::error::RagError;
use crate::model::CollectionSettings;
use crate::semantic::LOCAL_MODEL_ID;
use crate::util::now_utc_string;

pub const DEFAULT_DATA_DIR: &str = ".cache/ragindex";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderKind {
    LocalHash,
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

impl EmbeddingProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalHash => "local-hash",
            Self::OpenAi => "openai",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::LocalHash => LOCAL_MODEL_ID,
            Self::OpenAi => OPENAI_DEFAULT_EMBEDDING_MODEL,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local-hash" => Some(Self::LocalHash),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionProviderKind {
    None,
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

/// Process-wide settings, loaded once per invocation and passed explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub checkpoint_interval: usize,
    pub embedding_provider: EmbeddingProviderKind,
    pub embedding_model: String,
    pub completion_provider: CompletionProviderKind,
    pub completion_model: String,
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: usize,
    pub openai_base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            checkpoint_interval: 50,
            embedding_provider: EmbeddingProviderKind::LocalHash,
            embedding_model: LOCAL_MODEL_ID.to_string(),
            completion_provider: CompletionProviderKind::None,
            completion_model: "gpt-4o-mini".to_string(),
            top_k: 5,
            temperature: 0.2,
            max_tokens: 1024,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            request_timeout_secs: 60,
            max_retries: 4,
        }
    }
}

impl Settings {
    /// Reads the settings file; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "settings file missing; using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let mut settings: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        settings.align_embedding_model();
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        Chunker::new(self.chunk_size, self.chunk_overlap)?;
        if self.checkpoint_interval == 0 {
            return Err(RagError::Config("checkpoint_interval must be > 0".to_string()));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be > 0".to_string()));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(RagError::Config("embedding_model must not be empty".to_string()));
        }
        Ok(())
    }

    /// The local model id only names the hash embedder; any other provider
    /// left on it falls back to that provider's default model.
    pub fn align_embedding_model(&mut self) {
        if self.embedding_provider != EmbeddingProviderKind::LocalHash
            && self.embedding_model == LOCAL_MODEL_ID
        {
            self.embedding_model = self.embedding_provider.default_model().to_string();
        }
    }

    pub fn openai_api_key(&self) -> Option<String> {
        std::env::var(OPENAI_API_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn query_settings(&self) -> QuerySettings {
        QuerySettings {
            top_k: self.top_k,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Settings a brand-new collection is locked to.
    pub fn collection_defaults(&self) -> CollectionSettings {
        CollectionSettings {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            checkpoint_interval: self.checkpoint_interval,
            embedding_provider: self.embedding_provider.as_str().to_string(),
            embedding_model: self.embedding_model.clone(),
            created_at: now_utc_string(),
        }
    }
}

/// Per-query tunables, read fresh for every question.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuerySettings {
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Returns the collection's locked settings when it has them, otherwise the
/// current defaults. Warns when the caller asked for something different.
pub fn resolve_collection_settings(
    locked: Option<&CollectionSettings>,
    current: &Settings,
) -> CollectionSettings {
    let Some(locked) = locked else {
        return current.collection_defaults();
    };

    let ignored = ignored_settings(locked, current);
    if !ignored.is_empty() {
        warn!(
            ignored = %ignored.join(", "),
            locked_chunk_size = locked.chunk_size,
            locked_chunk_overlap = locked.chunk_overlap,
            locked_checkpoint_interval = locked.checkpoint_interval,
            locked_provider = %locked.embedding_provider,
            locked_model = %locked.embedding_model,
            "collection settings are locked; ignoring requested values"
        );
    }

    locked.clone()
}

/// Names of the requested settings that differ from a collection's lock.
fn ignored_settings(locked: &CollectionSettings, current: &Settings) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    if locked.chunk_size != current.chunk_size {
        ignored.push("chunk_size");
    }
    if locked.chunk_overlap != current.chunk_overlap {
        ignored.push("chunk_overlap");
    }
    if locked.checkpoint_interval != current.checkpoint_interval {
        ignored.push("checkpoint_interval");
    }
    if locked.embedding_provider != current.embedding_provider.as_str() {
        ignored.push("embedding_provider");
    }
    if locked.embedding_model != current.embedding_model {
        ignored.push("embedding_model");
    }
    ignored
}

pub fn validate_collection_name(name: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$")
        .context("failed to compile collection name regex")?;
    if !pattern.is_match(name) {
        bail!(
            "invalid collection name '{name}': use letters, digits, '.', '_' or '-', starting with a letter or digit"
        );
    }
    Ok(())
}

/// File layout for one collection under the data directory.
#[derive(Debug, Clone)]
pub struct CollectionPaths {
    pub name: String,
    pub embeddings: PathBuf,
    pub chunks: PathBuf,
    pub run_manifest: PathBuf,
}

impl CollectionPaths {
    pub fn new(data_dir: &Path, name: &str) -> Result<Self> {
        validate_collection_name(name)?;
        Ok(Self {
            name: name.to_string(),
            embeddings: data_dir.join(format!("{name}.embeddings.json")),
            chunks: data_dir.join(format!("{name}.chunks.json")),
            run_manifest: data_dir.join(format!("{name}.index_run.json")),
        })
    }
}

/// Collection names found in `data_dir`, sorted.
pub fn discover_collections(data_dir: &Path) -> Result<Vec<String>> {
    if !data_dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(data_dir)
        .with_context(|| format!("failed to read {}", data_dir.display()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", data_dir.display()))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(name) = file_name.strip_suffix(".embeddings.json") {
            if validate_collection_name(name).is_ok() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
