use tracing::debug;

use crate::error::RagError;
use crate::model::Chunk;
use crate::util::sha256_hex;

/// Fixed-size sliding-window chunker with overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be > 0".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Splits `text` into overlapping windows. The last window always ends at
    /// the end of the text; whitespace-only input yields no chunks.
    pub fn chunk(&self, text: &str, source_label: Option<&str>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte position of every char boundary, plus the end of the string.
        let mut boundaries = text
            .char_indices()
            .map(|(byte_index, _)| byte_index)
            .collect::<Vec<usize>>();
        let total_chars = boundaries.len();
        boundaries.push(text.len());

        let mut chunks = Vec::<Chunk>::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.chunk_size).min(total_chars);
            let window = &text[boundaries[start]..boundaries[end]];

            chunks.push(Chunk {
                text: window.to_string(),
                start_offset: start,
                end_offset: end,
                sequence_index: chunks.len(),
                chunk_id: sha256_hex(window),
                source_document: source_label.map(ToOwned::to_owned),
                total_chunks_in_document: 0,
            });

            if end >= total_chars {
                break;
            }
            start += self.step();
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks_in_document = total;
        }

        debug!(
            source = source_label.unwrap_or("<unlabeled>"),
            chars = total_chars,
            chunks = total,
            "chunked document"
        );

        chunks
    }
}
