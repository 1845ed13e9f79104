use anyhow::Result;
use timbre_core::CheckpointStore;
use timbre_etl::Config;

use super::open_checkpoints;

pub fn show_status(config: &Config) -> Result<()> {
    let checkpoints = open_checkpoints(&config.checkpoint_path)?;
    let embedded = checkpoints.count()?;

    println!("\n📊 Timbre Status\n");
    println!("  Checkpoints: {}", config.checkpoint_path.display());
    println!("  Embedded tracks: {embedded}");
    println!("  Catalog: {}", config.catalog_source());
    println!("  Output: {}", config.output_path.display());

    if embedded > 0 {
        println!("\n  Run `timbre export` to regenerate the SQL file from the checkpoints");
    }

    Ok(())
}
