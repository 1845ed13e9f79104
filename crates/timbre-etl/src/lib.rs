//! Embedding pipeline stages for timbre.
//!
//! Resolves catalog tracks to audio objects, decodes and resamples them,
//! extracts a fixed-width embedding, and records the result in the
//! checkpoint store and the SQL output file.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod audio;
pub mod catalog;
pub mod config;
pub mod embed;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod resolve;
pub mod sanitize;
pub mod sink;
pub mod store;

pub use catalog::CatalogSource;
pub use config::Config;
pub use embed::{EmbeddingExtractor, EmbeddingModel, MelEmbedder};
pub use error::{ErrorKind, PipelineError, StoreError, TrackError};
pub use export::export_checkpoints;
pub use pipeline::{Orchestrator, RunOptions, RunSummary};
pub use resolve::resolve_track;
pub use sanitize::sanitize;
pub use sink::{ResultSink, SqlSink};
pub use store::{ListPage, ObjectStore};
