//! Map a catalog track to an audio object key.
//!
//! Objects are expected under `Artist/Album/` (or `Artist/` when the track
//! has no album), named either exactly after the track or with a two-digit
//! track number in front (`01 - Title.mp3`). Artists are tried in catalog
//! order and the first accepted key in listing order wins, so when both
//! `Title.flac` and `02 - Title.mp3` exist the earlier listed one is used.

use std::sync::OnceLock;

use regex::Regex;
use timbre_core::model::{AudioObjectKey, TrackRecord};

use crate::error::{TrackError, TrackResult};
use crate::sanitize::sanitize;
use crate::store::{list_objects, ObjectStore};

/// Audio file extensions considered during resolution (lowercase).
pub const AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "flac", "wav", "m4a", "ogg"];

fn numbered_name() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // A literal pattern; construction cannot fail.
    #[allow(clippy::unwrap_used)]
    PATTERN.get_or_init(|| Regex::new(r"^\d{2}\s*-?\s*(.+)$").unwrap())
}

/// Sanitized search terms for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerms {
    pub name: String,
    pub album: String,
    pub artists: Vec<String>,
}

impl SearchTerms {
    /// Sanitize a track's fields. Artists that sanitize to nothing are dropped.
    #[must_use]
    pub fn from_track(track: &TrackRecord) -> Self {
        Self {
            name: sanitize(Some(&track.name)),
            album: sanitize(track.album.as_deref()),
            artists: track
                .artists
                .iter()
                .map(|a| sanitize(Some(a)))
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    /// Listing prefixes in the order they are searched.
    #[must_use]
    pub fn prefixes(&self) -> Vec<String> {
        self.artists
            .iter()
            .map(|artist| {
                if self.album.is_empty() {
                    format!("{artist}/")
                } else {
                    format!("{artist}/{}/", self.album)
                }
            })
            .collect()
    }
}

/// Whether `key` is an accepted audio file named after `track_name`.
///
/// `track_name` must already be sanitized; comparison ignores case.
#[must_use]
pub fn matches_track(key: &str, track_name: &str) -> bool {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    if stem.is_empty() || !AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
        return false;
    }

    let wanted = track_name.to_lowercase();
    if stem.to_lowercase() == wanted {
        return true;
    }

    numbered_name()
        .captures(stem)
        .and_then(|caps| caps.get(1))
        .is_some_and(|title| title.as_str().to_lowercase() == wanted)
}

/// Find the audio object for `track`.
///
/// A listing failure under one artist does not stop the search; it is
/// reported as a retrieval error only if no other artist yields a match.
pub fn resolve_track(track: &TrackRecord, store: &dyn ObjectStore) -> TrackResult<AudioObjectKey> {
    let terms = SearchTerms::from_track(track);

    if terms.name.is_empty() {
        return Err(TrackError::Resolution {
            reason: "track name is empty after sanitizing".to_string(),
        });
    }
    if terms.artists.is_empty() {
        return Err(TrackError::Resolution {
            reason: "no usable artist name".to_string(),
        });
    }

    let mut listing_error = None;

    for prefix in terms.prefixes() {
        log::debug!("Searching {:?} for {:?}", prefix, terms.name);
        for entry in list_objects(store, &prefix) {
            match entry {
                Ok(key) if matches_track(&key, &terms.name) => {
                    log::debug!("Resolved {} to {}", track.uri, key);
                    return Ok(AudioObjectKey::new(key));
                }
                Ok(_) => {}
                Err(source) => {
                    log::warn!("Listing {:?} failed: {}", prefix, source);
                    listing_error = Some(TrackError::Retrieval {
                        key: prefix.clone(),
                        source,
                    });
                }
            }
        }
    }

    Err(listing_error.unwrap_or_else(|| TrackError::Resolution {
        reason: format!(
            "no object named {:?} under {}",
            terms.name,
            terms.prefixes().join(", ")
        ),
    }))
}
