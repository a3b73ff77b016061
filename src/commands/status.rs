use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::{GlobalArgs, StatusArgs};
use crate::config::{CollectionPaths, discover_collections};
use crate::store::{EmbeddingStore, StoreSnapshot};

pub fn run(global: &GlobalArgs, args: StatusArgs) -> Result<()> {
    info!(data_dir = %global.data_dir.display(), "status requested");

    let names = match &args.collection {
        Some(name) => vec![name.clone()],
        None => discover_collections(&global.data_dir)?,
    };

    if names.is_empty() {
        warn!(data_dir = %global.data_dir.display(), "no collections found");
        return Ok(());
    }

    for name in names {
        let paths = CollectionPaths::new(&global.data_dir, &name)?;
        let store = EmbeddingStore::new(&paths.embeddings);
        if !store.exists() {
            warn!(collection = %name, path = %paths.embeddings.display(), "collection file missing");
            continue;
        }

        let snapshot = store.load()?;
        let dimensions = dimension_histogram(&snapshot);
        let sources = snapshot
            .records
            .iter()
            .filter_map(|record| record.source.as_deref())
            .collect::<HashSet<&str>>()
            .len();

        match &snapshot.settings {
            Some(settings) => info!(
                collection = %name,
                records = snapshot.records.len(),
                sources,
                dimensions = ?dimensions,
                chunk_size = settings.chunk_size,
                chunk_overlap = settings.chunk_overlap,
                checkpoint_interval = settings.checkpoint_interval,
                provider = %settings.embedding_provider,
                model = %settings.embedding_model,
                created_at = %settings.created_at,
                "collection status"
            ),
            None => info!(
                collection = %name,
                records = snapshot.records.len(),
                sources,
                dimensions = ?dimensions,
                "collection status (legacy, no locked settings)"
            ),
        }

        if dimensions.len() > 1 {
            warn!(
                collection = %name,
                dimensions = ?dimensions,
                "collection mixes embedding dimensions; mismatched records are ignored by search"
            );
        }
    }

    Ok(())
}

/// Record count per vector dimension.
fn dimension_histogram(snapshot: &StoreSnapshot) -> BTreeMap<usize, usize> {
    let mut histogram = BTreeMap::new();
    for record in &snapshot.records {
        *histogram.entry(record.dimensions()).or_insert(0) += 1;
    }
    histogram
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::model::EmbeddingRecord;

    #[test]
    fn dimension_histogram_counts_each_width() {
        let record = |dims: usize| EmbeddingRecord {
            text: "t".to_string(),
            vector: vec![1.0; dims],
            source: None,
            metadata: Map::new(),
        };
        let snapshot = StoreSnapshot {
            records: vec![record(4), record(4), record(8)],
            settings: None,
        };

        let histogram = dimension_histogram(&snapshot);
        assert_eq!(histogram.get(&4), Some(&2));
        assert_eq!(histogram.get(&8), Some(&1));
    }
}
