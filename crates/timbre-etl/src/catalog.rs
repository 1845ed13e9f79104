//! Loading the catalog snapshot.

use std::path::PathBuf;

use timbre_core::model::TrackRecord;

use crate::error::PipelineError;
use crate::store::ObjectStore;

/// Where the catalog snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// A JSON object in the object store (normally `tracks.json`).
    Object(String),
    /// A JSON file on the local filesystem.
    File(PathBuf),
}

impl CatalogSource {
    /// Fetch and parse the snapshot.
    ///
    /// Any failure here is fatal for the run.
    pub fn load(&self, store: &dyn ObjectStore) -> Result<Vec<TrackRecord>, PipelineError> {
        let bytes = match self {
            Self::Object(key) => store.get(key).map_err(|e| {
                PipelineError::CatalogUnavailable(format!("object {key}: {e}"))
            })?,
            Self::File(path) => std::fs::read(path).map_err(|e| {
                PipelineError::CatalogUnavailable(format!("{}: {}", path.display(), e))
            })?,
        };

        let tracks = parse_catalog(&bytes)?;
        log::info!("Loaded {} tracks from {}", tracks.len(), self);
        Ok(tracks)
    }
}

impl std::fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object(key) => write!(f, "object {key}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Parse a JSON array of track objects.
///
/// Entries without a uri are dropped with a warning; duplicate uris keep
/// their first occurrence.
pub fn parse_catalog(bytes: &[u8]) -> Result<Vec<TrackRecord>, PipelineError> {
    let tracks: Vec<TrackRecord> = serde_json::from_slice(bytes)?;
    let total = tracks.len();

    let mut seen = std::collections::HashSet::new();
    let tracks: Vec<TrackRecord> = tracks
        .into_iter()
        .filter(|t| !t.uri.trim().is_empty())
        .filter(|t| seen.insert(t.uri.clone()))
        .collect();

    if tracks.len() < total {
        log::warn!(
            "Dropped {} catalog entries with an empty or duplicate uri",
            total - tracks.len()
        );
    }
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use tempfile::TempDir;

    const CATALOG: &str = r#"[
        {"uri": "spotify:track:1", "name": "One More Time", "album": "Discovery", "artists": ["Daft Punk"]},
        {"uri": "spotify:track:2", "name": "Solo", "artists": "Someone"},
        {"uri": "", "name": "No id", "artists": ["X"]},
        {"uri": "spotify:track:1", "name": "Dup", "artists": ["Y"]}
    ]"#;

    #[test]
    fn test_parse_filters_bad_entries() {
        let tracks = parse_catalog(CATALOG.as_bytes()).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].name, "One More Time");
        assert_eq!(tracks[1].artists, vec!["Someone".to_string()]);
    }

    #[test]
    fn test_load_from_object_store() {
        let store = MemoryObjectStore::new();
        store.insert("tracks.json", CATALOG.as_bytes().to_vec());
        let tracks = CatalogSource::Object("tracks.json".to_string())
            .load(&store)
            .unwrap();
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tracks.json");
        std::fs::write(&path, CATALOG).unwrap();
        let tracks = CatalogSource::File(path).load(&MemoryObjectStore::new()).unwrap();
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn test_missing_catalog_is_fatal() {
        let err = CatalogSource::Object("tracks.json".to_string())
            .load(&MemoryObjectStore::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::CatalogUnavailable(_)));
    }

    #[test]
    fn test_malformed_catalog_is_fatal() {
        let err = parse_catalog(b"{\"not\": \"a list\"}").unwrap_err();
        assert!(matches!(err, PipelineError::CatalogParse(_)));
    }
}
