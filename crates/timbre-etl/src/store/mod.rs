//! Object-store access: prefix listing and whole-object reads.
//!
//! Backends only implement one page of a listing at a time;
//! [`list_objects`] walks the continuation tokens so callers see a single
//! sequence of keys.

pub mod local;
pub mod memory;
pub mod retry;
pub mod s3;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use retry::RetryingStore;
pub use s3::{S3ObjectStore, S3Settings};

use std::fmt;

use crate::error::StoreError;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Object keys on this page, in backend order.
    pub keys: Vec<String>,
    /// Token for the following page; `None` on the last page.
    pub next: Option<String>,
}

/// A blob store holding audio objects and the catalog snapshot.
///
/// All calls block until the backend answers.
pub trait ObjectStore: fmt::Debug {
    /// List one page of keys starting with `prefix`.
    fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage, StoreError>;

    /// Read a whole object.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Iterate every key under `prefix`, fetching pages lazily.
pub fn list_objects<'a>(store: &'a dyn ObjectStore, prefix: &str) -> Listing<'a> {
    Listing {
        store,
        prefix: prefix.to_string(),
        buffer: Vec::new().into_iter(),
        continuation: None,
        exhausted: false,
    }
}

/// Lazy, page-spanning key iterator returned by [`list_objects`].
///
/// Yields at most one error, after which it stops.
#[derive(Debug)]
pub struct Listing<'a> {
    store: &'a dyn ObjectStore,
    prefix: String,
    buffer: std::vec::IntoIter<String>,
    continuation: Option<String>,
    exhausted: bool,
}

impl Iterator for Listing<'_> {
    type Item = Result<String, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(key) = self.buffer.next() {
                return Some(Ok(key));
            }
            if self.exhausted {
                return None;
            }
            match self
                .store
                .list_page(&self.prefix, self.continuation.as_deref())
            {
                Ok(page) => {
                    self.exhausted = page.next.is_none();
                    self.continuation = page.next;
                    self.buffer = page.keys.into_iter();
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
