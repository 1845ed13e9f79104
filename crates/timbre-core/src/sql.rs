//! Rendering of per-track `UPDATE` statements.
//!
//! Each successfully embedded track produces one block of the form
//!
//! ```text
//! UPDATE track
//! SET embedding = '[0.100000,0.200000]'::vector
//! WHERE uri = 'spotify:track:1';
//!
//! ```
//!
//! which loads straight into a pgvector column of the matching dimension.

use std::fmt;

use crate::model::EmbeddingVector;

/// First line written to a fresh SQL output file.
pub const SQL_HEADER: &str = "-- Generated embeddings updates\n\n";

/// Decimal places used for each vector component.
pub const VECTOR_PRECISION: usize = 6;

/// A rendered "set embedding for uri" statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlUpdateRecord {
    uri: String,
    vector_literal: String,
}

impl SqlUpdateRecord {
    #[must_use]
    pub fn new(uri: impl Into<String>, embedding: &EmbeddingVector) -> Self {
        Self {
            uri: uri.into(),
            vector_literal: vector_literal(embedding.as_slice()),
        }
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn vector_literal(&self) -> &str {
        &self.vector_literal
    }
}

impl fmt::Display for SqlUpdateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UPDATE track\nSET embedding = '{}'::vector\nWHERE uri = '{}';\n\n",
            self.vector_literal,
            escape_literal(&self.uri)
        )
    }
}

/// Format components as a pgvector literal, e.g. `[0.100000,-0.500000]`.
#[must_use]
pub fn vector_literal(values: &[f32]) -> String {
    let components: Vec<String> = values
        .iter()
        .map(|v| format!("{:.*}", VECTOR_PRECISION, v))
        .collect();
    format!("[{}]", components.join(","))
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
