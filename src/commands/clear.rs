use anyhow::Result;
use tracing::{info, warn};

use crate::cli::{ClearArgs, GlobalArgs};
use crate::config::CollectionPaths;
use crate::store::EmbeddingStore;

pub fn run(global: &GlobalArgs, args: ClearArgs) -> Result<()> {
    let paths = CollectionPaths::new(&global.data_dir, &args.collection)?;
    let store = EmbeddingStore::new(&paths.embeddings);

    if !store.exists() {
        warn!(collection = %paths.name, "collection has no embeddings file; nothing to clear");
        return Ok(());
    }

    store.clear()?;
    info!(collection = %paths.name, path = %store.path().display(), "collection cleared");
    Ok(())
}
