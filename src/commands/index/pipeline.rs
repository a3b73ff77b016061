use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::chunker::Chunker;
use crate::documents::DocumentReader;
use crate::error::RagError;
use crate::model::{
    Chunk, ChunkArtifact, CollectionSettings, EmbeddingRecord, IndexReport, META_CHUNK_ID,
    META_EMBEDDED_AT, META_END_OFFSET, META_SEQUENCE_INDEX, META_SOURCE, META_START_OFFSET,
    META_TOTAL_CHUNKS,
};
use crate::providers::EmbeddingClient;
use crate::store::EmbeddingStore;
use crate::util::{now_utc_string, write_json_pretty};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndexStage {
    ReadDocuments,
    ChunkAll,
    PersistChunksForInspection,
    LoadExistingForResume,
    EmbedAndCheckpointLoop,
    Finalize,
}

impl IndexStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadDocuments => "read-documents",
            Self::ChunkAll => "chunk-all",
            Self::PersistChunksForInspection => "persist-chunks",
            Self::LoadExistingForResume => "load-existing",
            Self::EmbedAndCheckpointLoop => "embed-and-checkpoint",
            Self::Finalize => "finalize",
        }
    }
}

/// One indexing run over a collection: chunk, skip what is already stored,
/// embed the rest one chunk at a time and checkpoint every
/// `checkpoint_interval` new records.
pub struct IndexingPipeline<'a> {
    pub collection: &'a str,
    pub settings: &'a CollectionSettings,
    pub reader: &'a dyn DocumentReader,
    pub embedder: &'a dyn EmbeddingClient,
    pub store: &'a EmbeddingStore,
    pub chunks_path: &'a Path,
}

struct ResumeState {
    known_ids: HashSet<String>,
    existing_count: usize,
    dimensions: Option<usize>,
}

impl IndexingPipeline<'_> {
    pub fn run(&self, source: &Path) -> Result<IndexReport> {
        let chunker = Chunker::new(self.settings.chunk_size, self.settings.chunk_overlap)?;
        if self.settings.checkpoint_interval == 0 {
            return Err(RagError::Config("checkpoint_interval must be > 0".to_string()).into());
        }

        let stage = self.enter(IndexStage::ReadDocuments);
        let documents = self
            .reader
            .read_documents(source)
            .with_context(|| stage_failure(stage, self.collection))?;
        if documents.is_empty() {
            warn!(
                collection = %self.collection,
                path = %source.display(),
                "no documents found; nothing to index"
            );
            return Ok(IndexReport::default());
        }

        let stage = self.enter(IndexStage::ChunkAll);
        let chunks = documents
            .iter()
            .flat_map(|document| chunker.chunk(&document.text, Some(&document.file_name)))
            .collect::<Vec<Chunk>>();
        info!(
            collection = %self.collection,
            stage = stage.as_str(),
            documents = documents.len(),
            bytes = documents.iter().map(|document| document.size_bytes).sum::<u64>(),
            chunks = chunks.len(),
            "chunking complete"
        );

        let stage = self.enter(IndexStage::PersistChunksForInspection);
        self.persist_chunks(&chunks)
            .with_context(|| stage_failure(stage, self.collection))?;

        let stage = self.enter(IndexStage::LoadExistingForResume);
        let resume = self
            .load_resume_state()
            .with_context(|| stage_failure(stage, self.collection))?;

        let mut report = IndexReport {
            documents: documents.len(),
            chunks: chunks.len(),
            existing_count: resume.existing_count,
            ..IndexReport::default()
        };

        let stage = self.enter(IndexStage::EmbedAndCheckpointLoop);
        self.embed_and_checkpoint(&chunks, resume, &mut report)
            .with_context(|| stage_failure(stage, self.collection))?;

        report.total = report.existing_count + report.new_count;
        self.enter(IndexStage::Finalize);
        info!(
            collection = %self.collection,
            total = report.total,
            existing = report.existing_count,
            new = report.new_count,
            skipped = report.skipped_count,
            checkpoints = report.checkpoints,
            "indexing complete"
        );

        Ok(report)
    }

    fn enter(&self, stage: IndexStage) -> IndexStage {
        info!(collection = %self.collection, stage = stage.as_str(), "indexing stage");
        stage
    }

    fn persist_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let artifact = ChunkArtifact {
            manifest_version: 1,
            collection: self.collection,
            generated_at: now_utc_string(),
            chunk_count: chunks.len(),
            chunks,
        };
        write_json_pretty(self.chunks_path, &artifact)
    }

    fn load_resume_state(&self) -> Result<ResumeState, RagError> {
        let snapshot = self.store.load()?;

        if snapshot.records.is_empty() && snapshot.settings.is_none() {
            // First run for this collection: lock its settings now.
            self.store.save(&[], Some(self.settings))?;
            info!(
                collection = %self.collection,
                chunk_size = self.settings.chunk_size,
                chunk_overlap = self.settings.chunk_overlap,
                model = %self.settings.embedding_model,
                "created collection"
            );
        }

        let known_ids = snapshot
            .records
            .iter()
            .filter_map(|record| record.chunk_id().map(ToOwned::to_owned))
            .collect::<HashSet<String>>();

        info!(
            collection = %self.collection,
            existing = snapshot.records.len(),
            known_chunk_ids = known_ids.len(),
            "loaded existing embeddings for resume"
        );

        Ok(ResumeState {
            known_ids,
            existing_count: snapshot.records.len(),
            dimensions: snapshot.records.first().map(EmbeddingRecord::dimensions),
        })
    }

    fn embed_and_checkpoint(
        &self,
        chunks: &[Chunk],
        resume: ResumeState,
        report: &mut IndexReport,
    ) -> Result<(), RagError> {
        let ResumeState {
            mut known_ids,
            dimensions,
            ..
        } = resume;
        let mut dimensions = dimensions;
        let interval = self.settings.checkpoint_interval;
        let mut buffer = Vec::<EmbeddingRecord>::with_capacity(interval);

        for chunk in chunks {
            if chunk.text.trim().is_empty() {
                report.skipped_count += 1;
                debug!(
                    collection = %self.collection,
                    source = chunk.source_document.as_deref().unwrap_or("<unlabeled>"),
                    sequence_index = chunk.sequence_index,
                    "skipping whitespace-only chunk"
                );
                continue;
            }

            // Covers both resume and verbatim repeats within this run.
            if !known_ids.insert(chunk.chunk_id.clone()) {
                report.skipped_count += 1;
                continue;
            }

            let vector = self.embed_chunk(chunk)?;
            match dimensions {
                Some(expected) if expected != vector.len() => {
                    report.dimension_mismatches += 1;
                    warn!(
                        collection = %self.collection,
                        expected,
                        actual = vector.len(),
                        chunk_id = %chunk.chunk_id,
                        "embedding dimension differs from collection"
                    );
                }
                Some(_) => {}
                None => dimensions = Some(vector.len()),
            }

            buffer.push(record_for_chunk(chunk, vector));
            report.new_count += 1;

            if buffer.len() >= interval {
                self.checkpoint(&mut buffer, report)?;
            }
        }

        if !buffer.is_empty() {
            self.checkpoint(&mut buffer, report)?;
        }

        Ok(())
    }

    fn embed_chunk(&self, chunk: &Chunk) -> Result<Vec<f32>, RagError> {
        let source_label = chunk
            .source_document
            .clone()
            .unwrap_or_else(|| "<unlabeled>".to_string());

        let vector = self
            .embedder
            .embed(&chunk.text)
            .map_err(|err| RagError::Embedding {
                chunk_index: chunk.sequence_index,
                source_label: source_label.clone(),
                message: format!("{err:#}"),
            })?;

        if vector.is_empty() {
            return Err(RagError::Embedding {
                chunk_index: chunk.sequence_index,
                source_label,
                message: "embedding client returned an empty vector".to_string(),
            });
        }

        Ok(vector)
    }

    fn checkpoint(
        &self,
        buffer: &mut Vec<EmbeddingRecord>,
        report: &mut IndexReport,
    ) -> Result<(), RagError> {
        let outcome = self.store.save_incremental(buffer)?;
        report.checkpoints += 1;
        info!(
            collection = %self.collection,
            checkpoint = report.checkpoints,
            flushed = buffer.len(),
            inserted = outcome.inserted,
            replaced = outcome.replaced,
            stored = outcome.total,
            new_so_far = report.new_count,
            "checkpoint committed"
        );
        buffer.clear();
        Ok(())
    }
}

pub(super) fn record_for_chunk(chunk: &Chunk, vector: Vec<f32>) -> EmbeddingRecord {
    let mut metadata = Map::new();
    metadata.insert(META_CHUNK_ID.to_string(), Value::from(chunk.chunk_id.clone()));
    metadata.insert(META_SEQUENCE_INDEX.to_string(), Value::from(chunk.sequence_index));
    metadata.insert(META_START_OFFSET.to_string(), Value::from(chunk.start_offset));
    metadata.insert(META_END_OFFSET.to_string(), Value::from(chunk.end_offset));
    metadata.insert(
        META_TOTAL_CHUNKS.to_string(),
        Value::from(chunk.total_chunks_in_document),
    );
    if let Some(source) = &chunk.source_document {
        metadata.insert(META_SOURCE.to_string(), Value::from(source.clone()));
    }
    metadata.insert(META_EMBEDDED_AT.to_string(), Value::from(now_utc_string()));

    EmbeddingRecord {
        text: chunk.text.clone(),
        vector,
        source: chunk.source_document.clone(),
        metadata,
    }
}

fn stage_failure(stage: IndexStage, collection: &str) -> String {
    format!(
        "indexing collection '{collection}' failed during stage {}",
        stage.as_str()
    )
}
