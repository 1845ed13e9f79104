use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::CatalogSource;
use crate::error::PipelineError;
use crate::store::S3Settings;

/// Configuration for timbre.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (TIMBRE_* prefix)
/// 3. Config file (~/.config/timbre/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Custom S3 endpoint (R2, MinIO). Unset means AWS.
    ///
    /// Can be set via:
    /// - ENV: TIMBRE_OBJECT_STORE_ENDPOINT
    /// - Config: object_store_endpoint = "https://..."
    pub object_store_endpoint: Option<String>,

    /// Region passed to the S3 client. R2 expects "auto".
    pub object_store_region: String,

    /// Access key id; falls back to the AWS credential chain when unset.
    pub access_key_id: Option<String>,

    /// Secret access key; must be set together with `access_key_id`.
    pub secret_access_key: Option<String>,

    /// Bucket holding the audio files and the catalog snapshot.
    ///
    /// Can be set via:
    /// - ENV: TIMBRE_BUCKET_NAME
    /// - Config: bucket_name = "music"
    pub bucket_name: Option<String>,

    /// Local music library used instead of the bucket.
    ///
    /// Can be set via:
    /// - CLI: --music-dir /path/to/music
    /// - ENV: TIMBRE_MUSIC_DIR
    pub music_dir: Option<PathBuf>,

    /// Object key of the catalog snapshot.
    pub catalog_key: String,

    /// Local catalog file; takes precedence over `catalog_key`.
    ///
    /// Can be set via:
    /// - CLI: --catalog /path/to/tracks.json
    /// - ENV: TIMBRE_CATALOG_PATH
    pub catalog_path: Option<PathBuf>,

    /// Path to the SQLite checkpoint database.
    ///
    /// Can be set via:
    /// - CLI: --checkpoints /path/to/db
    /// - ENV: TIMBRE_CHECKPOINT_PATH
    /// - Default: ~/.local/share/timbre/checkpoints.db
    pub checkpoint_path: PathBuf,

    /// SQL file receiving one UPDATE per embedded track.
    ///
    /// Can be set via:
    /// - CLI: --output /path/to/updates.sql
    /// - ENV: TIMBRE_OUTPUT_PATH
    pub output_path: PathBuf,

    /// Sample rate all audio is converted to before embedding.
    pub canonical_sample_rate: u32,

    /// Number of components in every embedding.
    pub embedding_width: usize,

    /// Extra attempts for a transient listing or read failure. 0 never retries.
    pub retrieval_retries: usize,

    /// Seed for the traversal shuffle; unset draws from OS entropy.
    pub shuffle_seed: Option<u64>,

    /// Logger settings.
    pub logging: twyg::Opts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            object_store_endpoint: None,
            object_store_region: "auto".to_string(),
            access_key_id: None,
            secret_access_key: None,
            bucket_name: None,
            music_dir: None,
            catalog_key: "tracks.json".to_string(),
            catalog_path: None,
            checkpoint_path: default_checkpoint_path(),
            output_path: PathBuf::from("embeddings_updates.sql"),
            canonical_sample_rate: 48_000,
            embedding_width: 512,
            retrieval_retries: 0,
            shuffle_seed: None,
            logging: twyg::Opts::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/timbre/config.toml
    /// Reads environment variables with TIMBRE_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new()
            .context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path.to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder.add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("timbre");
        builder.add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build()
            .context("Failed to build configuration")?;

        Ok(config)
    }

    /// Check the settings a run depends on.
    ///
    /// Called once before any track is touched; failure aborts the run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.canonical_sample_rate == 0 {
            return Err(PipelineError::Config(
                "canonical_sample_rate must be positive".to_string(),
            ));
        }
        if self.embedding_width == 0 {
            return Err(PipelineError::Config(
                "embedding_width must be positive".to_string(),
            ));
        }
        match &self.music_dir {
            Some(dir) if !dir.is_dir() => {
                return Err(PipelineError::Config(format!(
                    "music_dir {} is not a directory",
                    dir.display()
                )));
            }
            Some(_) => {}
            None if self.bucket_name.as_deref().map_or(true, str::is_empty) => {
                return Err(PipelineError::Config(
                    "either bucket_name or music_dir must be set".to_string(),
                ));
            }
            None => {}
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(PipelineError::Config(
                "access_key_id and secret_access_key must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Where the catalog snapshot is read from.
    #[must_use]
    pub fn catalog_source(&self) -> CatalogSource {
        self.catalog_path.as_ref().map_or_else(
            || CatalogSource::Object(self.catalog_key.clone()),
            |path| CatalogSource::File(path.clone()),
        )
    }

    /// Connection settings for the S3 backend.
    #[must_use]
    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            endpoint: self.object_store_endpoint.clone(),
            region: self.object_store_region.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            bucket: self.bucket_name.clone().unwrap_or_default(),
        }
    }
}

/// Get the default checkpoint database path.
///
/// Returns: ~/.local/share/timbre/checkpoints.db (or platform equivalent)
fn default_checkpoint_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timbre")
        .join("checkpoints.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/timbre/config.toml
/// - macOS: ~/Library/Application Support/timbre/config.toml
/// - Windows: %APPDATA%\timbre\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timbre")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Timbre Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (TIMBRE_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# S3-compatible object store holding the audio files and tracks.json.
# For Cloudflare R2 use the account endpoint and region "auto".
#
# Can also be set via:
# - Environment: TIMBRE_OBJECT_STORE_ENDPOINT, TIMBRE_BUCKET_NAME, ...
#object_store_endpoint = "https://<account>.r2.cloudflarestorage.com"
object_store_region = "auto"
#access_key_id = "..."
#secret_access_key = "..."
bucket_name = "music"

# Use a local library laid out as Artist/Album/Track.ext instead of a bucket
#music_dir = "/path/to/music"

# Catalog snapshot: a JSON list of {uri, name, album, artists}
catalog_key = "tracks.json"
#catalog_path = "/path/to/tracks.json"

# Where progress is checkpointed and where SQL updates are appended
#checkpoint_path = "/path/to/checkpoints.db"
output_path = "embeddings_updates.sql"

# Audio normalization and embedding size (must match the vector column)
canonical_sample_rate = 48000
embedding_width = 512

# Extra attempts for failed object reads (0 = never retry)
retrieval_retries = 0

# Fix the traversal order (useful for reproducible runs)
#shuffle_seed = 42
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config())
        .context("Failed to write config file")?;

    Ok(true)
}
