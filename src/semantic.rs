use sha2::{Digest, Sha256};

pub const LOCAL_MODEL_ID: &str = "local-hash-v1";
pub const LOCAL_EMBEDDING_DIM: usize = 384;
const MIN_EMBEDDING_DIM: usize = 8;

// Per-feature weights. Trigrams keep words cut at chunk edges comparable.
const WORD_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.75;
const TRIGRAM_WEIGHT: f32 = 0.25;

/// Deterministic offline embedding. Word, word-bigram and character-trigram
/// features are hashed into `dimensions` signed buckets and the result is L2
/// normalised. The hash is SHA-256 based so stored vectors stay reproducible
/// across builds.
pub fn embed_text_local(text: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(MIN_EMBEDDING_DIM);
    let mut vector = vec![0_f32; dims];

    let words = lowercase_words(text);
    for (position, word) in words.iter().enumerate() {
        add_feature(&mut vector, &format!("w:{word}"), WORD_WEIGHT);
        if let Some(next) = words.get(position + 1) {
            add_feature(&mut vector, &format!("b:{word} {next}"), BIGRAM_WEIGHT);
        }
        let padded = format!("^{word}$").chars().collect::<Vec<char>>();
        for window in padded.windows(3) {
            let trigram = window.iter().collect::<String>();
            add_feature(&mut vector, &format!("t:{trigram}"), TRIGRAM_WEIGHT);
        }
    }

    l2_normalize(&mut vector);
    vector
}

fn lowercase_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| {
            raw.chars()
                .filter(|character| character.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

fn add_feature(vector: &mut [f32], feature: &str, weight: f32) {
    let digest = Sha256::digest(feature.as_bytes());
    let mut bucket_bytes = [0_u8; 8];
    bucket_bytes.copy_from_slice(&digest[..8]);
    let bucket = (u64::from_le_bytes(bucket_bytes) % vector.len() as u64) as usize;
    let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign * weight;
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|component| f64::from(*component).powi(2))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 {
        return;
    }

    for component in vector.iter_mut() {
        *component = (f64::from(*component) / norm) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::cosine_similarity;

    #[test]
    fn local_embedding_is_deterministic_and_normalized() {
        let first = embed_text_local("Checkpoint the embedding batch", 64);
        let second = embed_text_local("checkpoint   the EMBEDDING batch!", 64);
        assert_eq!(first, second);

        let norm = first.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blank_payload_embeds_to_zero_vector() {
        let vector = embed_text_local("  ...  ", 16);
        assert_eq!(vector.len(), 16);
        assert!(vector.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn dimensions_have_a_floor() {
        assert_eq!(embed_text_local("x", 2).len(), MIN_EMBEDDING_DIM);
    }

    #[test]
    fn overlapping_text_scores_higher_than_unrelated_text() {
        let query = embed_text_local("atomic rename keeps the store safe", 256);
        let related = embed_text_local("the store uses an atomic rename to stay safe", 256);
        let unrelated = embed_text_local("bananas grow in tropical climates", 256);

        let related_score = cosine_similarity(&query, &related).unwrap();
        let unrelated_score = cosine_similarity(&query, &unrelated).unwrap();
        assert!(related_score > unrelated_score);
    }

    #[test]
    fn truncated_words_still_share_features() {
        let whole = embed_text_local("checkpointing", 4096);
        let cut = embed_text_local("checkpoin", 4096);
        assert!(cosine_similarity(&whole, &cut).unwrap() > 0.2);
    }
}
