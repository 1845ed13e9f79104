use anyhow::{bail, Context};
use realfft::RealFftPlanner;

use super::{EmbeddingMatrix, EmbeddingModel};

/// Analysis window length in seconds.
const FRAME_SECS: f64 = 1.0;

/// Hop between consecutive windows in seconds.
const HOP_SECS: f64 = 0.1;

/// Deterministic log-mel spectral embedder.
///
/// Each 1 s window (0.1 s hop) is Hann-windowed, transformed with a real
/// FFT and summarised as `width` triangular mel-band energies, compressed
/// with `ln(1 + e)`. Clips shorter than one window are zero-padded.
#[derive(Debug, Clone)]
pub struct MelEmbedder {
    width: usize,
}

impl MelEmbedder {
    #[must_use]
    pub const fn new(width: usize) -> Self {
        Self { width }
    }
}

impl EmbeddingModel for MelEmbedder {
    fn width(&self) -> usize {
        self.width
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn embed(&self, samples: &[f32], sample_rate: u32) -> anyhow::Result<EmbeddingMatrix> {
        if self.width == 0 {
            bail!("embedding width must be positive");
        }
        if sample_rate == 0 {
            bail!("sample rate must be positive");
        }
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let frame_len = ((f64::from(sample_rate) * FRAME_SECS) as usize).max(2);
        let hop = ((f64::from(sample_rate) * HOP_SECS) as usize).max(1);

        let mut padded;
        let signal = if samples.len() < frame_len {
            padded = samples.to_vec();
            padded.resize(frame_len, 0.0);
            padded.as_slice()
        } else {
            samples
        };
        let frame_count = (signal.len() - frame_len) / hop + 1;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_len);

        let window: Vec<f32> = (0..frame_len)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / frame_len as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        let filters = mel_filterbank(self.width, frame_len / 2 + 1, sample_rate);

        let mut frame_buf = vec![0.0f32; frame_len];
        let mut spectrum = fft.make_output_vec();
        let mut scratch = fft.make_scratch_vec();
        let mut power = vec![0.0f32; spectrum.len()];
        let norm = 1.0 / frame_len as f32;

        let mut rows = Vec::with_capacity(frame_count);
        for frame_idx in 0..frame_count {
            let start = frame_idx * hop;
            for (out, (sample, w)) in frame_buf
                .iter_mut()
                .zip(signal[start..start + frame_len].iter().zip(&window))
            {
                *out = sample * w;
            }

            fft.process_with_scratch(&mut frame_buf, &mut spectrum, &mut scratch)
                .map_err(|e| anyhow::anyhow!("FFT failed: {e:?}"))
                .context("log-mel analysis")?;

            for (p, c) in power.iter_mut().zip(&spectrum) {
                *p = c.norm_sqr() * norm;
            }

            rows.push(
                filters
                    .iter()
                    .map(|band| {
                        let energy: f32 = band.iter().map(|&(bin, weight)| power[bin] * weight).sum();
                        energy.ln_1p()
                    })
                    .collect(),
            );
        }

        Ok(rows)
    }
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Sparse triangular filters: for each band, `(bin, weight)` pairs.
///
/// Bands are evenly spaced on the mel scale between 0 Hz and Nyquist. A
/// band too narrow to cover any bin takes its centre bin at full weight so
/// no band is identically zero.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn mel_filterbank(bands: usize, bins: usize, sample_rate: u32) -> Vec<Vec<(usize, f32)>> {
    let nyquist = f64::from(sample_rate) / 2.0;
    let max_mel = hz_to_mel(nyquist);
    let bin_hz = nyquist / (bins - 1).max(1) as f64;

    let edges: Vec<f64> = (0..bands + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (bands + 1) as f64) / bin_hz)
        .collect();

    (0..bands)
        .map(|band| {
            let (lo, centre, hi) = (edges[band], edges[band + 1], edges[band + 2]);
            let first = lo.ceil() as usize;
            let last = (hi.floor() as usize).min(bins - 1);

            let weights: Vec<(usize, f32)> = (first..=last)
                .filter_map(|bin| {
                    let x = bin as f64;
                    let weight = if x <= centre {
                        (x - lo) / (centre - lo).max(f64::EPSILON)
                    } else {
                        (hi - x) / (hi - centre).max(f64::EPSILON)
                    };
                    (weight > 0.0).then_some((bin, weight as f32))
                })
                .collect();

            if weights.is_empty() {
                vec![((centre.round() as usize).min(bins - 1), 1.0)]
            } else {
                weights
            }
        })
        .collect()
}
