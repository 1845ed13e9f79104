use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{ListPage, ObjectStore};
use crate::error::StoreError;

/// In-memory object store for tests.
///
/// Keys are listed in insertion order, split into pages of `page_size`.
/// Failures can be scripted per key to exercise retry and error paths.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
    page_size: usize,
    pending_failures: Mutex<HashMap<String, usize>>,
    fail_listing: AtomicBool,
    pending_list_failures: AtomicUsize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self {
            objects: Mutex::new(Vec::new()),
            page_size: 1000,
            pending_failures: Mutex::new(HashMap::new()),
            fail_listing: AtomicBool::new(false),
            pending_list_failures: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add or replace an object. Replacing keeps the original listing position.
    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        let key = key.into();
        let mut objects = lock(&self.objects);
        if let Some(entry) = objects.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = bytes;
        } else {
            objects.push((key, bytes));
        }
    }

    /// Make the next `times` reads of `key` fail with a transient error.
    pub fn fail_next_gets(&self, key: impl Into<String>, times: usize) {
        lock(&self.pending_failures).insert(key.into(), times);
    }

    /// Make every listing call fail.
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Make the next `times` listing calls fail with a transient error.
    pub fn fail_next_listings(&self, times: usize) {
        self.pending_list_failures.store(times, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Request {
                message: "listing disabled".to_string(),
            });
        }
        let scripted_failure = self
            .pending_list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Err(StoreError::Request {
                message: format!("simulated network failure listing {prefix}"),
            });
        }

        let start = match continuation {
            Some(token) => token.parse::<usize>().map_err(|_| StoreError::Request {
                message: format!("bad continuation token {token:?}"),
            })?,
            None => 0,
        };

        let matching: Vec<String> = lock(&self.objects)
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();

        let end = (start + self.page_size).min(matching.len());
        let keys = matching.get(start..end).map(<[String]>::to_vec).unwrap_or_default();
        let next = (end < matching.len()).then(|| end.to_string());
        Ok(ListPage { keys, next })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = lock(&self.pending_failures);
            if let Some(remaining) = failures.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StoreError::Request {
                        message: format!("simulated network failure reading {key}"),
                    });
                }
            }
        }

        lock(&self.objects)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }
}

// A poisoned lock only means another test thread panicked; the data is
// still usable for this store's purposes.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_is_not_found() {
        let store = MemoryObjectStore::new();
        assert!(matches!(store.get("x"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_scripted_failures_then_success() {
        let store = MemoryObjectStore::new();
        store.insert("k", vec![1, 2]);
        store.fail_next_gets("k", 1);

        assert!(store.get("k").is_err());
        assert_eq!(store.get("k").unwrap(), vec![1, 2]);
        assert_eq!(store.get_calls(), 2);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let store = MemoryObjectStore::new();
        store.insert("a", vec![1]);
        store.insert("b", vec![2]);
        store.insert("a", vec![3]);

        let page = store.list_page("", None).unwrap();
        assert_eq!(page.keys, vec!["a", "b"]);
        assert_eq!(store.get("a").unwrap(), vec![3]);
    }
}
