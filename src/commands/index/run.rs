use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::{GlobalArgs, IndexArgs};
use crate::config::{
    CollectionPaths, EmbeddingProviderKind, Settings, resolve_collection_settings,
};
use crate::documents::FormatRegistryReader;
use crate::model::{IndexReport, IndexRunManifest};
use crate::providers::build_embedding_client;
use crate::store::EmbeddingStore;
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::pipeline::IndexingPipeline;

pub fn run(global: &GlobalArgs, args: IndexArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let started = Instant::now();
    let run_id = format!("index-{}", utc_compact_string(started_ts));

    let mut settings = Settings::load(&global.settings_path())?;
    args.apply_overrides(&mut settings);
    settings.validate()?;

    ensure_directory(&global.data_dir)?;
    let paths = CollectionPaths::new(&global.data_dir, &args.collection)?;
    let store = EmbeddingStore::new(&paths.embeddings);

    if args.fresh {
        store.clear()?;
        warn!(collection = %paths.name, "cleared collection before indexing");
    }

    let locked = store.load()?.settings;
    let collection_settings = resolve_collection_settings(locked.as_ref(), &settings);
    let provider = EmbeddingProviderKind::parse(&collection_settings.embedding_provider)
        .with_context(|| {
            format!(
                "collection '{}' uses unknown embedding provider '{}'",
                paths.name, collection_settings.embedding_provider
            )
        })?;
    let embedder =
        build_embedding_client(provider, &collection_settings.embedding_model, &settings)?;
    let reader = FormatRegistryReader::default();

    info!(
        collection = %paths.name,
        run_id = %run_id,
        path = %args.path.display(),
        provider = provider.as_str(),
        model = embedder.model(),
        "starting indexing run"
    );

    let pipeline = IndexingPipeline {
        collection: &paths.name,
        settings: &collection_settings,
        reader: &reader,
        embedder: embedder.as_ref(),
        store: &store,
        chunks_path: &paths.chunks,
    };
    let result = pipeline.run(&args.path);

    let mut warnings = Vec::<String>::new();
    let (status, counts, failure_reason) = match &result {
        Ok(report) => {
            if report.documents == 0 {
                warnings.push("no documents found".to_string());
            }
            if report.dimension_mismatches > 0 {
                warnings.push(format!(
                    "{} embeddings differ in dimension from the collection",
                    report.dimension_mismatches
                ));
            }
            ("completed", report.clone(), None)
        }
        Err(err) => ("failed", IndexReport::default(), Some(format!("{err:#}"))),
    };

    let manifest = IndexRunManifest {
        manifest_version: 1,
        run_id,
        collection: paths.name.clone(),
        source_path: args.path.display().to_string(),
        started_at,
        finished_at: now_utc_string(),
        status: status.to_string(),
        settings: collection_settings.clone(),
        counts,
        duration_ms: started.elapsed().as_millis(),
        failure_reason,
        warnings,
    };
    write_json_pretty(&paths.run_manifest, &manifest)?;
    info!(path = %paths.run_manifest.display(), status, "wrote index run manifest");

    let report = result?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize index report")?
        );
    } else {
        println!(
            "Indexed '{}': {} embeddings total ({} existing, {} new, {} skipped)",
            paths.name, report.total, report.existing_count, report.new_count, report.skipped_count
        );
    }

    Ok(())
}
