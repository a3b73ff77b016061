use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RagError;
use crate::model::{CollectionSettings, EmbeddingRecord};
use crate::util::write_bytes_atomic;

const LEGACY_KEY_TEXT_CHARS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub records: Vec<EmbeddingRecord>,
    pub settings: Option<CollectionSettings>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub total: usize,
    pub inserted: usize,
    pub replaced: usize,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    embeddings: &'a [EmbeddingRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<&'a CollectionSettings>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoreFile {
    Current {
        embeddings: Vec<EmbeddingRecord>,
        #[serde(default)]
        settings: Option<CollectionSettings>,
    },
    LegacyArray(Vec<EmbeddingRecord>),
}

/// JSON-file container for one collection's embedding records.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    path: PathBuf,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<StoreSnapshot, RagError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StoreSnapshot::default()),
            Err(err) => return Err(RagError::io(&self.path, err)),
        };

        let parsed: StoreFile = serde_json::from_slice(&raw).map_err(|source| RagError::Parse {
            path: self.path.clone(),
            source,
        })?;

        Ok(match parsed {
            StoreFile::Current {
                embeddings,
                settings,
            } => StoreSnapshot {
                records: embeddings,
                settings,
            },
            StoreFile::LegacyArray(records) => StoreSnapshot {
                records,
                settings: None,
            },
        })
    }

    /// Replaces the whole file. Nothing is written if any record is invalid.
    pub fn save(
        &self,
        records: &[EmbeddingRecord],
        settings: Option<&CollectionSettings>,
    ) -> Result<(), RagError> {
        validate_records(records)?;

        let data = serde_json::to_vec_pretty(&StoreFileRef {
            embeddings: records,
            settings,
        })
        .map_err(|source| RagError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        write_bytes_atomic(&self.path, &data).map_err(|err| RagError::io(&self.path, err))?;
        debug!(path = %self.path.display(), records = records.len(), "embedding store saved");
        Ok(())
    }

    /// Merges `new_records` into the stored set, overwriting on key collision,
    /// and writes the result back with the existing settings untouched.
    pub fn save_incremental(&self, new_records: &[EmbeddingRecord]) -> Result<MergeOutcome, RagError> {
        validate_records(new_records)?;

        let snapshot = self.load()?;
        let mut merged = snapshot.records;
        let mut positions = HashMap::<String, usize>::with_capacity(merged.len());
        for (index, record) in merged.iter().enumerate() {
            positions.insert(merge_key(record), index);
        }

        let mut outcome = MergeOutcome::default();
        for record in new_records {
            let key = merge_key(record);
            match positions.get(&key) {
                Some(&index) => {
                    merged[index] = record.clone();
                    outcome.replaced += 1;
                }
                None => {
                    positions.insert(key, merged.len());
                    merged.push(record.clone());
                    outcome.inserted += 1;
                }
            }
        }
        outcome.total = merged.len();

        self.save(&merged, snapshot.settings.as_ref())?;
        Ok(outcome)
    }

    pub fn clear(&self) -> Result<(), RagError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(RagError::io(&self.path, err)),
        }
    }
}

fn validate_records(records: &[EmbeddingRecord]) -> Result<(), RagError> {
    for (index, record) in records.iter().enumerate() {
        if record.text.is_empty() {
            return Err(RagError::Validation {
                index,
                reason: "text is empty".to_string(),
            });
        }
        if record.vector.is_empty() {
            return Err(RagError::Validation {
                index,
                reason: "vector is empty".to_string(),
            });
        }
    }
    Ok(())
}

fn merge_key(record: &EmbeddingRecord) -> String {
    match record.chunk_id() {
        Some(chunk_id) => format!("id:{chunk_id}"),
        None => legacy_merge_key(record),
    }
}

/// Backward compatibility: records written before chunk ids existed are keyed
/// by a text prefix plus the first vector component. New records never take
/// this path.
fn legacy_merge_key(record: &EmbeddingRecord) -> String {
    let prefix = record
        .text
        .chars()
        .take(LEGACY_KEY_TEXT_CHARS)
        .collect::<String>();
    let first = record.vector.first().copied().unwrap_or_default();
    format!("legacy:{prefix}:{first}")
}
