use anyhow::{Context, Result};
use std::path::Path;
use timbre_core::CheckpointStore;
use timbre_etl::export::export_to_path;
use timbre_etl::Config;

use super::open_checkpoints;

/// Regenerate a SQL file from every checkpoint entry.
pub fn run_export(config: &Config, output: &Path) -> Result<()> {
    let checkpoints = open_checkpoints(&config.checkpoint_path)?;
    let total = checkpoints.count().context("Failed to count checkpoints")?;

    let written = export_to_path(&checkpoints, output)
        .with_context(|| format!("Failed to export to {}", output.display()))?;

    println!("✓ Exported {written} of {total} embeddings");
    println!("  to {}", output.display());

    Ok(())
}
