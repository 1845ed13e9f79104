//! Audio bytes to mono samples at the canonical rate.

pub mod decoder;
pub mod resampler;

pub use decoder::decode_bytes;
pub use resampler::{to_canonical_rate, Resample, RubatoResampler};
