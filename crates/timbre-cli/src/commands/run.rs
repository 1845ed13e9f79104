use anyhow::{Context, Result};
use timbre_etl::store::{LocalObjectStore, ObjectStore, S3ObjectStore};
use timbre_etl::{
    Config, EmbeddingExtractor, MelEmbedder, Orchestrator, RunOptions, RunSummary, SqlSink,
};

use super::open_checkpoints;

/// Build the object store the config points at.
pub fn connect_store(config: &Config) -> Result<Box<dyn ObjectStore>> {
    if let Some(dir) = &config.music_dir {
        log::info!("Reading audio from local directory {}", dir.display());
        let store = LocalObjectStore::new(dir.clone())
            .with_context(|| format!("Failed to open music directory {}", dir.display()))?;
        return Ok(Box::new(store));
    }

    let settings = config.s3_settings();
    log::info!("Reading audio from bucket {}", settings.bucket);
    let store = S3ObjectStore::connect(&settings).context("Failed to connect to object store")?;
    Ok(Box::new(store))
}

/// Embed every catalog track that has no checkpoint yet.
pub fn run_embed(config: &Config, limit: Option<usize>) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let objects = connect_store(config)?;
    let checkpoints = open_checkpoints(&config.checkpoint_path)?;
    let mut sink = SqlSink::open_append(&config.output_path).with_context(|| {
        format!("Failed to open output file {}", config.output_path.display())
    })?;

    let extractor = EmbeddingExtractor::new(
        Box::new(MelEmbedder::new(config.embedding_width)),
        config.embedding_width,
    );
    let options = RunOptions {
        limit,
        ..RunOptions::from_config(config)
    };

    let source = config.catalog_source();
    println!("\n🎵 Embedding tracks from {source}\n");
    println!("  Checkpoints: {}", config.checkpoint_path.display());
    println!("  Output: {}\n", config.output_path.display());

    let orchestrator = Orchestrator::new(objects.as_ref(), &checkpoints, extractor, options);
    let summary = orchestrator
        .run_catalog(&source, &mut sink)
        .context("Embedding run aborted")?;

    println!("\n{summary}");
    println!("  Wrote {} SQL updates to {}", sink.written(), config.output_path.display());

    for hint in recovery_hints(&summary) {
        println!("\n  {hint}");
    }

    Ok(())
}

/// What the user should do about a run's failures.
fn recovery_hints(summary: &RunSummary) -> Vec<String> {
    let mut hints = Vec::new();
    let retryable = summary.failed.saturating_sub(summary.unflushed);
    if retryable > 0 {
        hints.push(format!(
            "{retryable} failed tracks were not checkpointed; run `timbre run` again to retry them"
        ));
    }
    if summary.unflushed > 0 {
        hints.push(format!(
            "{} tracks were checkpointed but their SQL lines were not written; \
             run `timbre export` to regenerate the SQL file",
            summary.unflushed
        ));
    }
    hints
}
