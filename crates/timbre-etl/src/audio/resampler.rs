use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};
use timbre_core::model::SampleBuffer;

use crate::error::{TrackError, TrackResult};

/// Frames fed to rubato per call.
const CHUNK_FRAMES: usize = 4096;

/// Sample-rate conversion of a mono buffer.
pub trait Resample: std::fmt::Debug {
    fn resample(&self, buffer: &SampleBuffer, target_rate: u32) -> TrackResult<SampleBuffer>;
}

/// Bring `buffer` to `target_rate`, calling the resampler only when the
/// rates differ.
pub fn to_canonical_rate(
    buffer: SampleBuffer,
    target_rate: u32,
    resampler: &dyn Resample,
) -> TrackResult<SampleBuffer> {
    if buffer.sample_rate == target_rate {
        return Ok(buffer);
    }
    log::debug!(
        "Resampling {} samples from {} Hz to {} Hz",
        buffer.len(),
        buffer.sample_rate,
        target_rate
    );
    let resampled = resampler.resample(&buffer, target_rate)?;
    if resampled.sample_rate != target_rate || resampled.is_empty() {
        return Err(TrackError::Resample {
            from: buffer.sample_rate,
            to: target_rate,
            message: "resampler produced no usable output".to_string(),
        });
    }
    Ok(resampled)
}

/// Polynomial resampler backed by rubato's `FastFixedIn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RubatoResampler;

impl Resample for RubatoResampler {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn resample(&self, buffer: &SampleBuffer, target_rate: u32) -> TrackResult<SampleBuffer> {
        let from = buffer.sample_rate;
        let fail = |message: String| TrackError::Resample {
            from,
            to: target_rate,
            message,
        };

        if from == 0 || target_rate == 0 {
            return Err(fail("sample rate must be positive".to_string()));
        }

        let ratio = f64::from(target_rate) / f64::from(from);
        let mut resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Septic,
            CHUNK_FRAMES,
            1,
        )
        .map_err(|e| fail(format!("failed to create resampler: {e}")))?;

        let expected = (buffer.len() as f64 * ratio).ceil() as usize;
        let delay = resampler.output_delay();
        let mut output = Vec::with_capacity(expected + delay);

        let mut chunks = buffer.samples.chunks_exact(CHUNK_FRAMES);
        for chunk in chunks.by_ref() {
            let frames = resampler
                .process(&[chunk][..], None)
                .map_err(|e| fail(e.to_string()))?;
            output.extend_from_slice(&frames[0]);
        }

        let remainder = chunks.remainder();
        if !remainder.is_empty() {
            let frames = resampler
                .process_partial(Some(&[remainder][..]), None)
                .map_err(|e| fail(e.to_string()))?;
            output.extend_from_slice(&frames[0]);
        }

        // Drain the filter until the delayed tail is out.
        while output.len() < expected + delay {
            let frames = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| fail(e.to_string()))?;
            if frames[0].is_empty() {
                break;
            }
            output.extend_from_slice(&frames[0]);
        }

        let samples: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
        Ok(SampleBuffer::new(samples, target_rate))
    }
}
