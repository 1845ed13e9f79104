//! Bulk export of the checkpoint store as SQL updates.

use std::path::Path;

use timbre_core::sql::SqlUpdateRecord;
use timbre_core::CheckpointStore;

use crate::error::PipelineError;
use crate::sink::{ResultSink, SqlSink};

/// Write one update block per checkpoint entry to `sink`, in uri order.
///
/// The store is only read. Returns the number of records written.
pub fn export_checkpoints(
    store: &dyn CheckpointStore,
    sink: &mut dyn ResultSink,
) -> Result<usize, PipelineError> {
    let keys = store.keys()?;
    let mut written = 0;

    for uri in &keys {
        // Entries cannot be deleted by the pipeline, but another tool might.
        let Some(embedding) = store.get(uri)? else {
            log::warn!("Checkpoint for {} disappeared during export", uri);
            continue;
        };
        sink.append(&SqlUpdateRecord::new(uri.as_str(), &embedding))?;
        sink.flush()?;
        written += 1;
    }

    log::info!("Exported {} of {} checkpoint entries", written, keys.len());
    Ok(written)
}

/// Export the whole store into a fresh SQL file at `path`.
pub fn export_to_path(store: &dyn CheckpointStore, path: &Path) -> Result<usize, PipelineError> {
    let mut sink = SqlSink::create(path)?;
    export_checkpoints(store, &mut sink)
}
