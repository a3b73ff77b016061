use std::cell::RefCell;

use anyhow::{Result, bail};
use serde_json::Map;

use super::pipeline::QueryPipeline;
use crate::config::QuerySettings;
use crate::error::RagError;
use crate::model::EmbeddingRecord;
use crate::prompt::NumberedContextPrompt;
use crate::providers::{CompletionClient, CompletionRequest, EmbeddingClient};
use crate::store::EmbeddingStore;

/// Returns the same vector for every input.
struct FixedEmbedder {
    vector: Vec<f32>,
}

impl EmbeddingClient for FixedEmbedder {
    fn model(&self) -> &str {
        "fixed"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.vector.clone())
    }
}

struct BrokenEmbedder;

impl EmbeddingClient for BrokenEmbedder {
    fn model(&self) -> &str {
        "broken"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("invalid API key")
    }
}

/// Records every request it receives.
#[derive(Default)]
struct RecordingCompletion {
    requests: RefCell<Vec<(String, f32, usize)>>,
}

impl CompletionClient for RecordingCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.borrow_mut().push((
            request.prompt.to_string(),
            request.temperature,
            request.max_tokens,
        ));
        Ok("generated answer".to_string())
    }
}

fn record(text: &str, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        text: text.to_string(),
        vector,
        source: Some(format!("{text}.txt")),
        metadata: Map::new(),
    }
}

fn settings(top_k: usize) -> QuerySettings {
    QuerySettings {
        top_k,
        temperature: 0.1,
        max_tokens: 256,
    }
}

fn seeded_store(dir: &tempfile::TempDir) -> EmbeddingStore {
    let store = EmbeddingStore::new(dir.path().join("docs.embeddings.json"));
    store
        .save(
            &[
                record("east", vec![1.0, 0.0, 0.0, 0.0]),
                record("north", vec![0.0, 1.0, 0.0, 0.0]),
                record("northeast", vec![1.0, 1.0, 0.0, 0.0]),
            ],
            None,
        )
        .unwrap();
    store
}

#[test]
fn answers_with_ranked_numbered_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let embedder = FixedEmbedder {
        vector: vec![1.0, 0.0, 0.0, 0.0],
    };
    let completion = RecordingCompletion::default();
    let assembler = NumberedContextPrompt::default();
    let pipeline = QueryPipeline {
        collection: "docs",
        store: &store,
        embedder: &embedder,
        assembler: &assembler,
        completion: &completion,
    };

    let answer = pipeline.ask("  which way is east? ", &settings(2)).unwrap();

    assert_eq!(answer.answer, "generated answer");
    assert_eq!(answer.question, "which way is east?");
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.sources[0].record.text, "east");
    assert_eq!(answer.sources[1].record.text, "northeast");
    assert!(answer.prompt.contains("[1] east"));
    assert!(answer.prompt.contains("[2] northeast"));
    assert!(!answer.prompt.contains("[3]"));

    let requests = completion.requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, answer.prompt);
    assert_eq!(requests[0].1, 0.1);
    assert_eq!(requests[0].2, 256);
}

#[test]
fn settings_apply_per_call_without_rebuilding() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let embedder = FixedEmbedder {
        vector: vec![1.0, 1.0, 0.0, 0.0],
    };
    let completion = RecordingCompletion::default();
    let assembler = NumberedContextPrompt::default();
    let pipeline = QueryPipeline {
        collection: "docs",
        store: &store,
        embedder: &embedder,
        assembler: &assembler,
        completion: &completion,
    };

    let narrow = pipeline.ask("q", &settings(1)).unwrap();
    let wide = pipeline.ask("q", &settings(3)).unwrap();

    assert_eq!(narrow.sources.len(), 1);
    assert_eq!(narrow.sources[0].record.text, "northeast");
    assert_eq!(wide.sources.len(), 3);
}

#[test]
fn empty_collection_reports_no_embeddings() {
    let dir = tempfile::tempdir().unwrap();
    let store = EmbeddingStore::new(dir.path().join("empty.embeddings.json"));
    let embedder = FixedEmbedder {
        vector: vec![1.0, 0.0],
    };
    let completion = RecordingCompletion::default();
    let assembler = NumberedContextPrompt::default();
    let pipeline = QueryPipeline {
        collection: "empty",
        store: &store,
        embedder: &embedder,
        assembler: &assembler,
        completion: &completion,
    };

    let err = pipeline.ask("anything", &settings(3)).unwrap_err();
    assert!(matches!(err, RagError::NoEmbeddings(ref name) if name == "empty"));
    assert!(completion.requests.borrow().is_empty());
}

#[test]
fn incomparable_vectors_report_no_relevant_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let embedder = FixedEmbedder {
        vector: vec![1.0, 0.0],
    };
    let completion = RecordingCompletion::default();
    let assembler = NumberedContextPrompt::default();
    let pipeline = QueryPipeline {
        collection: "docs",
        store: &store,
        embedder: &embedder,
        assembler: &assembler,
        completion: &completion,
    };

    let err = pipeline.ask("anything", &settings(3)).unwrap_err();
    assert!(matches!(err, RagError::NoRelevantContext));
    assert!(err.is_missing_data());
}

#[test]
fn embedding_failure_is_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let completion = RecordingCompletion::default();
    let assembler = NumberedContextPrompt::default();
    let pipeline = QueryPipeline {
        collection: "docs",
        store: &store,
        embedder: &BrokenEmbedder,
        assembler: &assembler,
        completion: &completion,
    };

    let err = pipeline.ask("anything", &settings(3)).unwrap_err();
    match err {
        RagError::Provider(message) => assert!(message.contains("invalid API key")),
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[test]
fn blank_question_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    let embedder = FixedEmbedder {
        vector: vec![1.0, 0.0, 0.0, 0.0],
    };
    let completion = RecordingCompletion::default();
    let assembler = NumberedContextPrompt::default();
    let pipeline = QueryPipeline {
        collection: "docs",
        store: &store,
        embedder: &embedder,
        assembler: &assembler,
        completion: &completion,
    };

    assert!(matches!(
        pipeline.ask("   ", &settings(3)),
        Err(RagError::InvalidQuery(_))
    ));
}
