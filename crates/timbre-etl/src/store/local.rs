use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{ListPage, ObjectStore};
use crate::error::StoreError;

/// A music library on disk, laid out as `Artist/Album/Track.ext`.
///
/// Keys are paths relative to the root with `/` separators. A listing is
/// always a single page, sorted by file name at every directory level.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Deepest directory that can contain every key starting with `prefix`.
    fn walk_root(&self, prefix: &str) -> PathBuf {
        match prefix.rsplit_once('/') {
            Some((dirs, _)) => self.root.join(dirs),
            None => self.root.clone(),
        }
    }
}

impl ObjectStore for LocalObjectStore {
    fn list_page(&self, prefix: &str, _continuation: Option<&str>) -> Result<ListPage, StoreError> {
        let start = self.walk_root(prefix);
        if !start.is_dir() {
            return Ok(ListPage::default());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&start).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Request {
                message: format!("failed to walk {}: {}", start.display(), e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(key) = self.key_for(entry.path()) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        Ok(ListPage { keys, next: None })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.root.join(key);
        if !path.is_file() {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(std::fs::read(path)?)
    }
}
