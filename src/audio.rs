//! Audio file decoding using symphonia.
//!
//! Decodes audio files to raw PCM samples for embedding extraction. Decoded
//! audio is held channel-major (one sample buffer per channel) so the channel
//! axis precedes the sample axis when the samples are handed to the model.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::embed::ExtractError;

/// Decoded audio with channel-major sample layout.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// One sample buffer per channel; all buffers have equal length
    pub channels: Vec<Vec<f32>>,
    /// Original sample rate of the audio
    pub sample_rate: u32,
}

impl AudioData {
    /// Number of channels
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn num_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds
    pub fn duration_s(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f32 / self.sample_rate as f32
    }

    /// Mix down to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => {
                let len = self.num_samples();
                let mut mono = vec![0.0f32; len];
                for channel in &self.channels {
                    for (acc, &s) in mono.iter_mut().zip(channel.iter()) {
                        *acc += s;
                    }
                }
                for s in &mut mono {
                    *s /= n as f32;
                }
                mono
            }
        }
    }

    /// Build channel-major audio from interleaved samples
    pub fn from_interleaved(samples: &[f32], num_channels: usize, sample_rate: u32) -> Self {
        if num_channels <= 1 {
            return Self {
                channels: vec![samples.to_vec()],
                sample_rate,
            };
        }

        let frames = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (channel, &s) in channels.iter_mut().zip(frame.iter()) {
                channel.push(s);
            }
        }

        Self {
            channels,
            sample_rate,
        }
    }
}

/// Audio file decoder using symphonia
pub struct AudioDecoder;

impl AudioDecoder {
    /// Decode an audio file to channel-major f32 samples.
    ///
    /// Fails if the file is unreadable, has an unsupported codec, or decodes
    /// to zero samples.
    pub fn decode_file(path: &Path) -> Result<AudioData, ExtractError> {
        let file = File::open(path)?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Hint the probe with the file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| ExtractError::Decode(format!("Failed to probe format: {e}")))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(ExtractError::NoAudioTrack)?;

        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(ExtractError::MissingSampleRate)?;

        let num_channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| ExtractError::Decode(format!("Failed to create decoder: {e}")))?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            match format.next_packet() {
                Ok(packet) => {
                    if packet.track_id() != track_id {
                        continue;
                    }

                    match decoder.decode(&packet) {
                        Ok(decoded) => append_samples(&decoded, &mut samples),
                        Err(SymphoniaError::DecodeError(e)) => {
                            tracing::warn!(error = %e, "Decode error, skipping packet");
                            continue;
                        }
                        Err(e) => {
                            return Err(ExtractError::Decode(format!("Decode error: {e}")));
                        }
                    }
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Error reading packet, stopping decode");
                    break;
                }
            }
        }

        if samples.is_empty() {
            return Err(ExtractError::Decode("No audio samples decoded".to_string()));
        }

        Ok(AudioData::from_interleaved(
            &samples,
            num_channels,
            sample_rate,
        ))
    }
}

/// Append decoded samples, interleaved, to the output buffer
fn append_samples(decoded: &AudioBufferRef, output: &mut Vec<f32>) {
    let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
    sample_buf.copy_interleaved_ref(decoded.clone());
    output.extend_from_slice(sample_buf.samples());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interleaved_mono() {
        let audio = AudioData::from_interleaved(&[0.1, 0.2, 0.3], 1, 16_000);
        assert_eq!(audio.num_channels(), 1);
        assert_eq!(audio.num_samples(), 3);
        assert_eq!(audio.channels[0], vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_from_interleaved_stereo() {
        let interleaved = [1.0, -1.0, 0.5, -0.5, 0.25, -0.25];
        let audio = AudioData::from_interleaved(&interleaved, 2, 44_100);
        assert_eq!(audio.num_channels(), 2);
        assert_eq!(audio.num_samples(), 3);
        assert_eq!(audio.channels[0], vec![1.0, 0.5, 0.25]);
        assert_eq!(audio.channels[1], vec![-1.0, -0.5, -0.25]);
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let interleaved = [1.0, 0.0, 0.5, 0.5, 0.0, 1.0];
        let audio = AudioData::from_interleaved(&interleaved, 2, 16_000);
        let mono = audio.to_mono();
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.5).abs() < 1e-6);
        assert!((mono[1] - 0.5).abs() < 1e-6);
        assert!((mono[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_duration() {
        let audio = AudioData::from_interleaved(&vec![0.0; 32_000], 1, 16_000);
        assert!((audio.duration_s() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_missing_file() {
        let err = AudioDecoder::decode_file(Path::new("/nonexistent/audio.wav"));
        assert!(matches!(err, Err(ExtractError::Io(_))));
    }
}
