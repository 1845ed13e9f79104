//! Checkpoint storage: which tracks already have an embedding.
//!
//! The orchestrator consults the store before processing a track and writes
//! to it as soon as an embedding is computed. Stores must tolerate several
//! independent workers writing the same uri; the last write wins and, since
//! embeddings are deterministic for identical audio, they converge.

pub mod memory;

pub use memory::MemoryCheckpointStore;

use crate::error::Result;
use crate::model::EmbeddingVector;

/// Durable map from track uri to embedding.
pub trait CheckpointStore: std::fmt::Debug {
    /// Whether an entry exists for `uri`.
    fn has(&self, uri: &str) -> Result<bool>;

    /// The stored embedding for `uri`, if any.
    fn get(&self, uri: &str) -> Result<Option<EmbeddingVector>>;

    /// Insert or overwrite the entry for `uri`.
    ///
    /// Must not return until the write is durable.
    fn put(&self, uri: &str, embedding: &EmbeddingVector) -> Result<()>;

    /// All stored uris, in ascending order.
    fn keys(&self) -> Result<Vec<String>>;

    /// Number of stored entries.
    fn count(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }
}
