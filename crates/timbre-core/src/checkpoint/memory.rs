use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::CheckpointStore;
use crate::error::{Error, Result};
use crate::model::EmbeddingVector;

/// In-process checkpoint store, used by tests and dry runs.
///
/// `fail_writes` makes every subsequent `put` fail, which lets tests
/// exercise the persistence-error path of the orchestrator.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<BTreeMap<String, EmbeddingVector>>,
    fail_writes: AtomicBool,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `put` fail (or succeed again) from now on.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Result<BTreeMap<String, EmbeddingVector>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, EmbeddingVector>>> {
        self.entries
            .lock()
            .map_err(|_| Error::InvalidData("checkpoint store lock poisoned".to_string()))
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn has(&self, uri: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(uri))
    }

    fn get(&self, uri: &str) -> Result<Option<EmbeddingVector>> {
        Ok(self.lock()?.get(uri).cloned())
    }

    fn put(&self, uri: &str, embedding: &EmbeddingVector) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other(
                "checkpoint writes disabled",
            )));
        }
        self.lock()?.insert(uri.to_string(), embedding.clone());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}
