use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const META_CHUNK_ID: &str = "chunkId";
pub const META_SEQUENCE_INDEX: &str = "sequenceIndex";
pub const META_START_OFFSET: &str = "startOffset";
pub const META_END_OFFSET: &str = "endOffset";
pub const META_TOTAL_CHUNKS: &str = "totalChunksInDocument";
pub const META_SOURCE: &str = "source";
pub const META_EMBEDDED_AT: &str = "embeddedAt";

/// A bounded window of a source document. Offsets count chars, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub sequence_index: usize,
    pub chunk_id: String,
    pub source_document: Option<String>,
    pub total_chunks_in_document: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EmbeddingRecord {
    pub fn chunk_id(&self) -> Option<&str> {
        self.metadata.get(META_CHUNK_ID).and_then(Value::as_str)
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// Settings captured when a collection is created. Never rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub checkpoint_interval: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub record: EmbeddingRecord,
    pub score: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub text: String,
    pub file_name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub documents: usize,
    pub chunks: usize,
    pub existing_count: usize,
    pub new_count: usize,
    pub skipped_count: usize,
    pub total: usize,
    pub checkpoints: usize,
    pub dimension_mismatches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub collection: String,
    pub source_path: String,
    pub started_at: String,
    pub finished_at: String,
    pub status: String,
    pub settings: CollectionSettings,
    pub counts: IndexReport,
    pub duration_ms: u128,
    pub failure_reason: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkArtifact<'a> {
    pub manifest_version: u32,
    pub collection: &'a str,
    pub generated_at: String,
    pub chunk_count: usize,
    pub chunks: &'a [Chunk],
}
