use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the indexing and retrieval core.
///
/// Command glue wraps these in `anyhow::Error`; callers that need to react to
/// a specific condition recover it with `downcast_ref::<RagError>()`.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid record at index {index}: {reason}")]
    Validation { index: usize, reason: String },

    #[error("embedding request failed for chunk {chunk_index} of {source_label}: {message}")]
    Embedding {
        chunk_index: usize,
        source_label: String,
        message: String,
    },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("no embeddings found in collection '{0}'")]
    NoEmbeddings(String),

    #[error("no relevant context found for the question")]
    NoRelevantContext,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize records for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RagError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the missing-data outcomes callers are expected to special-case.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, Self::NoEmbeddings(_) | Self::NoRelevantContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_error_names_chunk_and_source() {
        let err = RagError::Embedding {
            chunk_index: 7,
            source_label: "notes.md".to_string(),
            message: "rate limited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "embedding request failed for chunk 7 of notes.md: rate limited"
        );
    }

    #[test]
    fn io_error_display_includes_path() {
        let err = RagError::io(
            "/tmp/docs.embeddings.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("/tmp/docs.embeddings.json"));
        assert!(rendered.contains("denied"));
    }

    #[test]
    fn serialize_and_parse_errors_read_differently() {
        let source = || serde_json::from_str::<u8>("x").unwrap_err();
        let parse = RagError::Parse {
            path: "/data/docs.embeddings.json".into(),
            source: source(),
        };
        let serialize = RagError::Serialize {
            path: "/data/docs.embeddings.json".into(),
            source: source(),
        };
        assert!(parse.to_string().starts_with("failed to parse /data/docs.embeddings.json"));
        assert!(
            serialize
                .to_string()
                .starts_with("failed to serialize records for /data/docs.embeddings.json")
        );
    }

    #[test]
    fn missing_data_conditions_are_distinguished() {
        assert!(RagError::NoEmbeddings("docs".to_string()).is_missing_data());
        assert!(RagError::NoRelevantContext.is_missing_data());
        assert!(!RagError::Config("bad".to_string()).is_missing_data());
    }

    #[test]
    fn rag_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = RagError::NoRelevantContext.into();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::NoRelevantContext)
        ));
    }
}
