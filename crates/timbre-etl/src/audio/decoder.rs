use std::io::Cursor;

use symphonia::core::audio::SampleBuffer as PcmBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use timbre_core::model::{AudioObjectKey, SampleBuffer};

use crate::error::{TrackError, TrackResult};

/// Decode an in-memory audio object to mono PCM at its native rate.
///
/// Interleaved channels are averaged. The key's extension is passed to the
/// prober as a hint; the container is still sniffed from the bytes.
pub fn decode_bytes(key: &AudioObjectKey, bytes: Vec<u8>) -> TrackResult<SampleBuffer> {
    let decode_error = |message: String| TrackError::Decode {
        key: key.to_string(),
        message,
    };

    let mss = MediaSourceStream::new(
        Box::new(Cursor::new(bytes)),
        MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    if let Some(ext) = key.extension() {
        hint.with_extension(&ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(format!("failed to probe format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| decode_error("no default audio track".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(format!("failed to create decoder: {e}")))?;

    let mut pcm: Option<PcmBuffer<f32>> = None;
    let mut mono = Vec::new();
    let mut sample_rate = codec_params.sample_rate;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_error(format!("failed to read packet: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(audio_buf) => {
                let spec = *audio_buf.spec();
                let frames = audio_buf.capacity();
                let needed = frames * spec.channels.count();
                if pcm.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                    pcm = Some(PcmBuffer::<f32>::new(frames as u64, spec));
                }
                sample_rate.get_or_insert(spec.rate);

                if let Some(buf) = pcm.as_mut() {
                    buf.copy_interleaved_ref(audio_buf);
                    downmix_into(buf.samples(), spec.channels.count(), &mut mono);
                }
            }
            // Corrupt packets are skipped, as players do.
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet in {}: {}", key, e);
            }
            Err(e) => return Err(decode_error(format!("failed to decode packet: {e}"))),
        }
    }

    if mono.is_empty() {
        return Err(decode_error("decoded to zero samples".to_string()));
    }

    let sample_rate = sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| decode_error("unknown sample rate".to_string()))?;

    Ok(SampleBuffer::new(mono, sample_rate))
}

/// Append the channel average of each interleaved frame to `out`.
#[allow(clippy::cast_precision_loss)]
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..frames {
                for ch in 0..channels {
                    // Left at +0.5, right at -0.5 so a stereo mix averages to zero.
                    let value = if ch == 0 { 16_384i16 } else { -16_384i16 };
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_downmix_averages_frames() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 3.0, -1.0, 1.0], 2, &mut out);
        assert_eq!(out, vec![2.0, 0.0]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let mut out = vec![9.0];
        downmix_into(&[1.0, 2.0], 1, &mut out);
        assert_eq!(out, vec![9.0, 1.0, 2.0]);
    }

    #[test]
    fn test_decode_mono_wav() {
        let key = AudioObjectKey::new("A/B/track.wav");
        let buffer = decode_bytes(&key, wav_bytes(44_100, 1, 4_410)).unwrap();
        assert_eq!(buffer.sample_rate, 44_100);
        assert_eq!(buffer.len(), 4_410);
        assert!((buffer.samples[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_stereo_wav_is_downmixed() {
        let key = AudioObjectKey::new("A/B/track.wav");
        let buffer = decode_bytes(&key, wav_bytes(48_000, 2, 480)).unwrap();
        assert_eq!(buffer.sample_rate, 48_000);
        assert_eq!(buffer.len(), 480);
        assert!(buffer.samples.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let key = AudioObjectKey::new("A/B/track.mp3");
        let result = decode_bytes(&key, b"definitely not audio".to_vec());
        assert!(matches!(result, Err(TrackError::Decode { .. })));
    }

    #[test]
    fn test_header_only_wav_is_decode_error() {
        let key = AudioObjectKey::new("A/B/silence.wav");
        let result = decode_bytes(&key, wav_bytes(48_000, 1, 0));
        assert!(matches!(result, Err(TrackError::Decode { .. })));
    }
}
