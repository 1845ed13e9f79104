//! Embedding extraction.
//!
//! An [`EmbeddingModel`] turns samples into one row per analysis frame.
//! [`EmbeddingExtractor`] averages the rows into a single vector and
//! enforces the run-wide width and rejects NaN or infinite components.

pub mod mel;

pub use mel::MelEmbedder;

use timbre_core::model::{EmbeddingVector, SampleBuffer};

use crate::error::{TrackError, TrackResult};

/// Per-frame embedding rows, each `width` values long.
pub type EmbeddingMatrix = Vec<Vec<f32>>;

/// Opaque audio embedding capability.
pub trait EmbeddingModel: std::fmt::Debug {
    /// Width of every row this model produces.
    fn width(&self) -> usize;

    /// Embed mono samples recorded at `sample_rate`.
    fn embed(&self, samples: &[f32], sample_rate: u32) -> anyhow::Result<EmbeddingMatrix>;
}

/// Validating wrapper that reduces a model's frame rows to one vector.
#[derive(Debug)]
pub struct EmbeddingExtractor {
    model: Box<dyn EmbeddingModel>,
    width: usize,
}

impl EmbeddingExtractor {
    /// Wrap `model`, pinning every output to `width` components.
    #[must_use]
    pub fn new(model: Box<dyn EmbeddingModel>, width: usize) -> Self {
        if model.width() != width {
            log::warn!(
                "Embedding model produces {} values per frame but the run expects {}",
                model.width(),
                width
            );
        }
        Self { model, width }
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Embed a buffer. Never retries; any failure is final for this track.
    pub fn extract(&self, buffer: &SampleBuffer) -> TrackResult<EmbeddingVector> {
        let rows = self
            .model
            .embed(&buffer.samples, buffer.sample_rate)
            .map_err(|e| TrackError::Embedding(format!("model failed: {e:#}")))?;

        if rows.is_empty() {
            return Err(TrackError::Embedding("empty embedding".to_string()));
        }

        if let Some((frame, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != self.width) {
            return Err(TrackError::Embedding(format!(
                "frame {} has {} values, expected {}",
                frame,
                row.len(),
                self.width
            )));
        }

        EmbeddingVector::with_width(mean_rows(&rows, self.width), self.width)
            .map_err(|e| TrackError::Embedding(e.to_string()))
    }
}

/// Arithmetic mean across frames.
#[allow(clippy::cast_precision_loss)]
fn mean_rows(rows: &[Vec<f32>], width: usize) -> Vec<f32> {
    let mut sums = vec![0.0f64; width];
    for row in rows {
        for (sum, value) in sums.iter_mut().zip(row) {
            *sum += f64::from(*value);
        }
    }
    let count = rows.len() as f64;
    #[allow(clippy::cast_possible_truncation)]
    sums.into_iter().map(|sum| (sum / count) as f32).collect()
}
