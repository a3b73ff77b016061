use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{GlobalArgs, QueryArgs};
use crate::config::{CollectionPaths, EmbeddingProviderKind, Settings};
use crate::error::RagError;
use crate::prompt::NumberedContextPrompt;
use crate::providers::{EmbeddingClient, build_completion_client, build_embedding_client};
use crate::store::EmbeddingStore;

use super::pipeline::{QueryAnswer, QueryPipeline};

pub fn run(global: &GlobalArgs, args: QueryArgs) -> Result<()> {
    let paths = CollectionPaths::new(&global.data_dir, &args.collection)?;
    let store = EmbeddingStore::new(&paths.embeddings);
    let settings = load_settings(global, &args)?;

    // Questions must be embedded with the model the collection was built with.
    let locked = store.load()?.settings;
    let (provider, model) = match &locked {
        Some(locked) => (
            EmbeddingProviderKind::parse(&locked.embedding_provider).with_context(|| {
                format!(
                    "collection '{}' uses unknown embedding provider '{}'",
                    paths.name, locked.embedding_provider
                )
            })?,
            locked.embedding_model.clone(),
        ),
        None => (settings.embedding_provider, settings.embedding_model.clone()),
    };
    let embedder = build_embedding_client(provider, &model, &settings)?;

    if let Some(question) = &args.question {
        return answer_question(&paths.name, &store, embedder.as_ref(), &settings, question, args.json)
            .inspect_err(log_guidance);
    }

    info!(collection = %paths.name, "reading questions from stdin, one per line");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read question from stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        // Reloaded per question so edits to the settings file apply immediately.
        let settings = load_settings(global, &args)?;
        match answer_question(&paths.name, &store, embedder.as_ref(), &settings, &line, args.json) {
            Ok(()) => {}
            Err(err) if is_missing_data(&err) => log_guidance(&err),
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

fn load_settings(global: &GlobalArgs, args: &QueryArgs) -> Result<Settings> {
    let mut settings = Settings::load(&global.settings_path())?;
    args.apply_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn answer_question(
    collection: &str,
    store: &EmbeddingStore,
    embedder: &dyn EmbeddingClient,
    settings: &Settings,
    question: &str,
    json: bool,
) -> Result<()> {
    let completion = build_completion_client(settings)?;
    let assembler = NumberedContextPrompt::default();
    let pipeline = QueryPipeline {
        collection,
        store,
        embedder,
        assembler: &assembler,
        completion: completion.as_ref(),
    };

    let answer = pipeline.ask(question, &settings.query_settings())?;
    print_answer(&answer, json)
}

fn print_answer(answer: &QueryAnswer, json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if json {
        serde_json::to_writer_pretty(&mut out, answer).context("failed to write answer json")?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "{}", answer.answer.trim())?;
    writeln!(out)?;
    writeln!(out, "Sources:")?;
    for source in &answer.sources {
        writeln!(
            out,
            "  [{}] score={:.4} {}",
            source.rank,
            source.score,
            source.record.source.as_deref().unwrap_or("<unknown>")
        )?;
    }
    out.flush()?;
    Ok(())
}

fn is_missing_data(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RagError>()
        .map(RagError::is_missing_data)
        .unwrap_or(false)
}

fn log_guidance(err: &anyhow::Error) {
    match err.downcast_ref::<RagError>() {
        Some(RagError::NoEmbeddings(collection)) => warn!(
            collection = %collection,
            "collection has no embeddings; run `ragindex index --collection {collection} <path>` first"
        ),
        Some(RagError::NoRelevantContext) => warn!(
            "no stored chunk is comparable with the question; the collection may have been built with a different embedding model"
        ),
        _ => {}
    }
}
