use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One catalog entry: a song identified by a stable uri.
///
/// Records are loaded from the catalog snapshot at the start of a run and
/// are never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Unique, stable identifier (e.g. `spotify:track:...`).
    pub uri: String,

    /// Track title. A `null` title in the snapshot becomes an empty string.
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,

    /// Album title, absent for singles or when the catalog has none.
    #[serde(default, deserialize_with = "optional_album")]
    pub album: Option<String>,

    /// Credited artists in catalog order.
    ///
    /// The snapshot may hold a single string or a list; non-string entries
    /// in a list are dropped.
    #[serde(default, deserialize_with = "artist_list")]
    pub artists: Vec<String>,
}

impl TrackRecord {
    #[must_use]
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        album: Option<String>,
        artists: Vec<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            album,
            artists,
        }
    }
}

impl fmt::Display for TrackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artists.join(", "), self.name)
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn optional_album<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let album = Option::<String>::deserialize(deserializer)?;
    Ok(album.filter(|a| !a.trim().is_empty()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawArtists {
    One(String),
    Many(Vec<serde_json::Value>),
}

fn artist_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let artists = match Option::<RawArtists>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(RawArtists::One(artist)) => vec![artist],
        Some(RawArtists::Many(values)) => values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
    };
    Ok(artists)
}

/// Key of a blob in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioObjectKey(String);

impl AudioObjectKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased file extension, if the key has one.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let file_name = self.0.rsplit('/').next().unwrap_or(&self.0);
        file_name
            .rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_lowercase())
    }
}

impl fmt::Display for AudioObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AudioObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
