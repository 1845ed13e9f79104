pub mod config;
pub mod export;
pub mod run;
pub mod status;

pub use export::run_export;
pub use run::run_embed;
pub use status::show_status;

use anyhow::{Context, Result};
use std::path::Path;
use timbre_core::schema::CheckpointDb;

/// Open the checkpoint database, creating its directory if needed.
pub fn open_checkpoints(path: &Path) -> Result<CheckpointDb> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    CheckpointDb::open(path)
        .with_context(|| format!("Failed to open checkpoint database {}", path.display()))
}
