//! Error types for the embedding pipeline.
//!
//! [`TrackError`] covers everything that can go wrong while processing one
//! track; the orchestrator counts it and moves on. [`PipelineError`] is the
//! infrastructure class that aborts a run before any track is touched.

use std::fmt;

use thiserror::Error;

/// Errors raised by an object-store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed a request.
    #[error("object store request failed: {message}")]
    Request { message: String },

    /// The object does not exist.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// A local filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend could not be set up.
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns `true` when the error may clear up if the request is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Io(_))
    }
}

/// The stage a per-track failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Resolution,
    Retrieval,
    Decode,
    Resample,
    Embedding,
    Persistence,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolution => "resolution",
            Self::Retrieval => "retrieval",
            Self::Decode => "decode",
            Self::Resample => "resample",
            Self::Embedding => "embedding",
            Self::Persistence => "persistence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure confined to one track.
#[derive(Debug, Error)]
pub enum TrackError {
    /// No audio object matched the track's metadata.
    #[error("no audio object found: {reason}")]
    Resolution { reason: String },

    /// Listing or fetching from the object store failed, or the payload was empty.
    #[error("retrieval of {key} failed: {source}")]
    Retrieval {
        key: String,
        #[source]
        source: StoreError,
    },

    /// The object was fetched but empty.
    #[error("object {key} is empty")]
    EmptyObject { key: String },

    /// The bytes could not be decoded to samples.
    #[error("could not decode {key}: {message}")]
    Decode { key: String, message: String },

    /// Sample-rate conversion failed.
    #[error("resampling {from} Hz -> {to} Hz failed: {message}")]
    Resample { from: u32, to: u32, message: String },

    /// The embedding model returned nothing usable.
    #[error("embedding rejected: {0}")]
    Embedding(String),

    /// The checkpoint store could not be read or written.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The checkpoint was written but the SQL output was not; `export`
    /// recovers the line.
    #[error("checkpointed but SQL output failed: {0}")]
    Unflushed(String),
}

impl TrackError {
    /// The stage this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolution { .. } => ErrorKind::Resolution,
            Self::Retrieval { .. } | Self::EmptyObject { .. } => ErrorKind::Retrieval,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Resample { .. } => ErrorKind::Resample,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::Persistence(_) | Self::Unflushed(_) => ErrorKind::Persistence,
        }
    }

    /// Returns `true` for retrieval failures that a retry may fix.
    ///
    /// Empty payloads and missing objects are not transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Retrieval { source, .. } if source.is_transient())
    }
}

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The catalog snapshot could not be fetched.
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The catalog snapshot could not be parsed.
    #[error("catalog is not valid JSON: {0}")]
    CatalogParse(#[from] serde_json::Error),

    /// The checkpoint store could not be opened or read.
    #[error("checkpoint store error: {0}")]
    Checkpoint(#[from] timbre_core::Error),

    /// The object store could not be set up.
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    /// The output file could not be opened or written.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for per-track results.
pub type TrackResult<T> = std::result::Result<T, TrackError>;
