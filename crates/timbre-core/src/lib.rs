//! Core domain model for timbre.
//!
//! This crate defines the track and embedding types that flow through the
//! pipeline, the SQL update records emitted for each embedded track, and the
//! checkpoint store (trait, SQLite schema and in-memory implementation) that
//! makes runs resumable.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod checkpoint;
pub mod error;
pub mod model;
pub mod schema;
pub mod sql;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use error::{Error, Result};
pub use schema::CheckpointDb;
pub use sql::SqlUpdateRecord;
