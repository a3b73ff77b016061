use tracing::debug;

use crate::error::RagError;
use crate::model::{EmbeddingRecord, SearchResult};

/// Cosine similarity in `f64`. `None` when the vectors are not comparable
/// (empty or different lengths); `Some(0.0)` when either has zero magnitude.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> Option<f64> {
    if left.is_empty() || left.len() != right.len() {
        return None;
    }

    let mut dot = 0.0_f64;
    let mut left_norm = 0.0_f64;
    let mut right_norm = 0.0_f64;
    for (left_value, right_value) in left.iter().zip(right.iter()) {
        let (l, r) = (f64::from(*left_value), f64::from(*right_value));
        dot += l * r;
        left_norm += l * l;
        right_norm += r * r;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return Some(0.0);
    }

    Some(dot / (left_norm.sqrt() * right_norm.sqrt()))
}

/// Exhaustive top-K scan. Records with empty or mismatched vectors are
/// skipped; ties keep the records' original order.
pub fn search(
    query_vector: &[f32],
    records: &[EmbeddingRecord],
    top_k: usize,
) -> Result<Vec<SearchResult>, RagError> {
    if query_vector.is_empty() {
        return Err(RagError::InvalidQuery("query vector is empty".to_string()));
    }
    if top_k == 0 {
        return Err(RagError::InvalidQuery("top_k must be > 0".to_string()));
    }

    let mut scored = Vec::<(usize, f64)>::with_capacity(records.len());
    let mut skipped = 0usize;
    for (index, record) in records.iter().enumerate() {
        match cosine_similarity(query_vector, &record.vector) {
            Some(score) => scored.push((index, score)),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(
            skipped,
            query_dim = query_vector.len(),
            "skipped records with incomparable vectors"
        );
    }

    scored.sort_by(|left, right| right.1.total_cmp(&left.1));
    scored.truncate(top_k);

    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(position, (index, score))| SearchResult {
            record: records[index].clone(),
            score,
            rank: position + 1,
        })
        .collect())
}
