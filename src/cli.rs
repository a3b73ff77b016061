use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    CompletionProviderKind, DEFAULT_DATA_DIR, EmbeddingProviderKind, SETTINGS_FILE_NAME, Settings,
};

#[derive(Parser, Debug)]
#[command(
    name = "ragindex",
    version,
    about = "Resumable document indexing and retrieval-augmented question answering"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Index(IndexArgs),
    Query(QueryArgs),
    Status(StatusArgs),
    Clear(ClearArgs),
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long, global = true)]
    pub settings_path: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(SETTINGS_FILE_NAME))
    }
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long, default_value = "default")]
    pub collection: String,

    /// File or directory to index.
    pub path: PathBuf,

    /// Delete the collection before indexing.
    #[arg(long, default_value_t = false)]
    pub fresh: bool,

    #[arg(long)]
    pub chunk_size: Option<usize>,

    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    #[arg(long)]
    pub checkpoint_interval: Option<usize>,

    #[arg(long, value_enum)]
    pub embedding_provider: Option<EmbeddingProviderKind>,

    #[arg(long)]
    pub embedding_model: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl IndexArgs {
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(value) = self.chunk_size {
            settings.chunk_size = value;
        }
        if let Some(value) = self.chunk_overlap {
            settings.chunk_overlap = value;
        }
        if let Some(value) = self.checkpoint_interval {
            settings.checkpoint_interval = value;
        }
        if let Some(value) = self.embedding_provider {
            if value != settings.embedding_provider && self.embedding_model.is_none() {
                settings.embedding_model = value.default_model().to_string();
            }
            settings.embedding_provider = value;
        }
        if let Some(value) = &self.embedding_model {
            settings.embedding_model = value.clone();
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long, default_value = "default")]
    pub collection: String,

    /// Question to answer; without it, one question is read per stdin line.
    #[arg(long)]
    pub question: Option<String>,

    #[arg(long)]
    pub top_k: Option<usize>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<usize>,

    #[arg(long, value_enum)]
    pub completion_provider: Option<CompletionProviderKind>,

    #[arg(long)]
    pub completion_model: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl QueryArgs {
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(value) = self.top_k {
            settings.top_k = value;
        }
        if let Some(value) = self.temperature {
            settings.temperature = value;
        }
        if let Some(value) = self.max_tokens {
            settings.max_tokens = value;
        }
        if let Some(value) = self.completion_provider {
            settings.completion_provider = value;
        }
        if let Some(value) = &self.completion_model {
            settings.completion_model = value.clone();
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub collection: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ClearArgs {
    #[arg(long)]
    pub collection: String,
}
