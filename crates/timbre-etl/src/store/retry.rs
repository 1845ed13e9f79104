use std::time::Duration;

use backon::{BlockingRetryable, ExponentialBuilder};

use super::{ListPage, ObjectStore};
use crate::error::StoreError;

/// Retries transient failures of another store with exponential backoff.
///
/// Wraps both listings and reads, so a network blip while resolving a track
/// is treated the same as one while fetching it. With `retries == 0` every
/// call goes straight through.
#[derive(Debug, Clone, Copy)]
pub struct RetryingStore<'a> {
    inner: &'a dyn ObjectStore,
    retries: usize,
    delay: Duration,
}

impl<'a> RetryingStore<'a> {
    /// `delay` is the first backoff; it doubles on each retry.
    #[must_use]
    pub fn new(inner: &'a dyn ObjectStore, retries: usize, delay: Duration) -> Self {
        Self {
            inner,
            retries,
            delay,
        }
    }

    fn with_retry<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if self.retries == 0 {
            return op();
        }

        op.retry(
            ExponentialBuilder::default()
                .with_min_delay(self.delay)
                .with_max_times(self.retries),
        )
        .when(StoreError::is_transient)
        .notify(|err, delay| {
            log::warn!("Retrying {} in {:?}: {}", what, delay, err);
        })
        .call()
    }
}

impl ObjectStore for RetryingStore<'_> {
    fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage, StoreError> {
        self.with_retry(&format!("listing {prefix:?}"), || {
            self.inner.list_page(prefix, continuation)
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.with_retry(key, || self.inner.get(key))
    }
}
