pub mod embedding;
pub mod sample;
pub mod track;

pub use embedding::EmbeddingVector;
pub use sample::SampleBuffer;
pub use track::{AudioObjectKey, TrackRecord};
