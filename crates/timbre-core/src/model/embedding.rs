use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A fixed-length embedding whose components are all finite.
///
/// The length is a run-wide constant; [`EmbeddingVector::with_width`]
/// checks it at construction so downstream code never sees a
/// mis-sized vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Build a vector, rejecting NaN and infinite components.
    ///
    /// Neither has a pgvector literal or a JSON representation.
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::NonFiniteComponent {
                index,
                value: values[index],
            });
        }
        Ok(Self(values))
    }

    /// Build a vector of exactly `width` finite components.
    pub fn with_width(values: Vec<f32>, width: usize) -> Result<Self> {
        if values.len() != width {
            return Err(Error::DimensionMismatch {
                expected: width,
                actual: values.len(),
            });
        }
        Self::new(values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl<'de> Deserialize<'de> for EmbeddingVector {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = Vec::<f32>::deserialize(deserializer)?;
        Self::new(values).map_err(serde::de::Error::custom)
    }
}

impl AsRef<[f32]> for EmbeddingVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}
