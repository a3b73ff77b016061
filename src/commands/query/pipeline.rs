use serde::Serialize;
use tracing::{debug, info};

use crate::config::QuerySettings;
use crate::error::RagError;
use crate::model::SearchResult;
use crate::prompt::PromptAssembler;
use crate::providers::{CompletionClient, CompletionRequest, EmbeddingClient};
use crate::search::search;
use crate::store::EmbeddingStore;

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub question: String,
    pub answer: String,
    pub prompt: String,
    pub sources: Vec<SearchResult>,
}

/// Question answering over one collection. Holds no tunables: every call
/// receives the current `QuerySettings`.
pub struct QueryPipeline<'a> {
    pub collection: &'a str,
    pub store: &'a EmbeddingStore,
    pub embedder: &'a dyn EmbeddingClient,
    pub assembler: &'a dyn PromptAssembler,
    pub completion: &'a dyn CompletionClient,
}

impl QueryPipeline<'_> {
    pub fn ask(&self, question: &str, settings: &QuerySettings) -> Result<QueryAnswer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuery("question is empty".to_string()));
        }

        let query_vector = self
            .embedder
            .embed(question)
            .map_err(|err| RagError::Provider(format!("failed to embed question: {err:#}")))?;

        let records = self.store.load()?.records;
        if records.is_empty() {
            return Err(RagError::NoEmbeddings(self.collection.to_string()));
        }

        let sources = search(&query_vector, &records, settings.top_k)?;
        if sources.is_empty() {
            return Err(RagError::NoRelevantContext);
        }
        info!(
            collection = %self.collection,
            scanned = records.len(),
            retrieved = sources.len(),
            top_score = sources[0].score,
            "retrieved context"
        );

        let contexts = sources
            .iter()
            .map(|result| result.record.text.clone())
            .collect::<Vec<String>>();
        let prompt = self.assembler.build(question, &contexts);
        debug!(prompt_chars = prompt.len(), "assembled prompt");

        let answer = self
            .completion
            .complete(&CompletionRequest {
                prompt: &prompt,
                temperature: settings.temperature,
                max_tokens: settings.max_tokens,
            })
            .map_err(|err| RagError::Provider(format!("completion failed: {err:#}")))?;

        Ok(QueryAnswer {
            question: question.to_string(),
            answer,
            prompt,
            sources,
        })
    }
}
