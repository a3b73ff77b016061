use anyhow::{Context, Result};

use crate::config::{CompletionProviderKind, EmbeddingProviderKind, Settings};
use crate::semantic::{LOCAL_EMBEDDING_DIM, embed_text_local};

mod openai;

pub use openai::{OpenAiCompletion, OpenAiEmbedder};

/// Turns text into vectors. Implementations own their retry policy.
pub trait EmbeddingClient {
    fn model(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Request envelope shared by the completion providers.
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
}

pub trait CompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Offline embedder backed by hashed token features.
pub struct LocalHashEmbedder {
    model: String,
    dimensions: usize,
}

impl LocalHashEmbedder {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions,
        }
    }
}

impl EmbeddingClient for LocalHashEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed_text_local(text, self.dimensions))
    }
}

/// Completion provider that hands back the assembled prompt unchanged, for
/// inspecting retrieval without a model.
pub struct PromptEcho;

impl CompletionClient for PromptEcho {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        Ok(request.prompt.to_string())
    }
}

pub fn build_embedding_client(
    kind: EmbeddingProviderKind,
    model: &str,
    settings: &Settings,
) -> Result<Box<dyn EmbeddingClient>> {
    match kind {
        EmbeddingProviderKind::LocalHash => {
            Ok(Box::new(LocalHashEmbedder::new(model, LOCAL_EMBEDDING_DIM)))
        }
        EmbeddingProviderKind::OpenAi => {
            let api_key = settings
                .openai_api_key()
                .context("OPENAI_API_KEY is required for the openai embedding provider")?;
            let embedder = OpenAiEmbedder::new(
                api_key,
                settings.openai_base_url.clone(),
                model.to_string(),
                settings.request_timeout(),
                settings.max_retries,
            )?;
            Ok(Box::new(embedder))
        }
    }
}

pub fn build_completion_client(settings: &Settings) -> Result<Box<dyn CompletionClient>> {
    match settings.completion_provider {
        CompletionProviderKind::None => Ok(Box::new(PromptEcho)),
        CompletionProviderKind::OpenAi => {
            let api_key = settings
                .openai_api_key()
                .context("OPENAI_API_KEY is required for the openai completion provider")?;
            let client = OpenAiCompletion::new(
                api_key,
                settings.openai_base_url.clone(),
                settings.completion_model.clone(),
                settings.request_timeout(),
                settings.max_retries,
            )?;
            Ok(Box::new(client))
        }
    }
}
