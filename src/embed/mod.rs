//! Speaker-embedding extraction.
//!
//! The pretrained model is an opaque function from audio to a fixed-length
//! vector. It is loaded once per run, bound to a single device, and passed
//! into the extraction loop as an explicit dependency.

mod onnx;

pub use onnx::{Device, OnnxSpeakerModel};

use std::path::Path;

use tracing::{debug, info};

use crate::audio::{AudioData, AudioDecoder};
use crate::manifest::{Manifest, ManifestError};

/// Extraction error types
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Audio track is missing a sample rate")]
    MissingSampleRate,

    #[error("ONNX runtime error: {0}")]
    Onnx(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// An extracted embedding paired with its sample metadata
#[derive(Debug, Clone)]
pub struct SampleEmbedding {
    /// Path of the source audio file
    pub file_path: String,
    /// Raw class label from the manifest
    pub label: String,
    /// Fixed-length embedding vector
    pub vector: Vec<f32>,
}

/// An embedding model bound to a device for the duration of a run.
///
/// Implementations must be deterministic: the same audio input yields the
/// same vector for a fixed model and device.
pub trait EmbeddingModel {
    /// Output dimension of the model
    fn dimension(&self) -> usize;

    /// Compute the embedding of one audio sample
    fn embed(&self, audio: &AudioData) -> Result<Vec<f32>, ExtractError>;
}

/// Extract the embedding and raw label for a single audio file
pub fn extract(
    model: &dyn EmbeddingModel,
    manifest: &Manifest,
    path: &Path,
) -> Result<SampleEmbedding, ExtractError> {
    let label = manifest.label_for(path)?.to_string();

    let audio = AudioDecoder::decode_file(path)?;
    debug!(
        file = %path.display(),
        channels = audio.num_channels(),
        duration_s = audio.duration_s(),
        "Audio decoded"
    );

    let vector = model.embed(&audio)?;
    if vector.len() != model.dimension() {
        return Err(ExtractError::DimensionMismatch {
            expected: model.dimension(),
            got: vector.len(),
        });
    }

    Ok(SampleEmbedding {
        file_path: path.to_string_lossy().into_owned(),
        label,
        vector,
    })
}

/// Extract embeddings for every sample in a manifest, in manifest order.
///
/// A failure on any file aborts the whole batch.
pub fn extract_all(
    model: &dyn EmbeddingModel,
    manifest: &Manifest,
) -> Result<Vec<SampleEmbedding>, ExtractError> {
    let mut embeddings = Vec::with_capacity(manifest.len());

    for sample in manifest.samples() {
        embeddings.push(extract(model, manifest, &sample.audio_path)?);
    }

    info!(count = embeddings.len(), "Embeddings extracted");
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::AudioSample;
    use std::path::PathBuf;

    /// Deterministic stand-in model: mean and energy statistics of the mono
    /// mixdown, tiled to the requested dimension.
    struct StubModel {
        dim: usize,
    }

    impl StubModel {
        fn new(dim: usize) -> Self {
            Self { dim }
        }
    }

    impl EmbeddingModel for StubModel {
        fn dimension(&self) -> usize {
            self.dim
        }

        fn embed(&self, audio: &AudioData) -> Result<Vec<f32>, ExtractError> {
            let mono = audio.to_mono();
            let n = mono.len().max(1) as f32;
            let mean = mono.iter().sum::<f32>() / n;
            let energy = mono.iter().map(|s| s * s).sum::<f32>() / n;

            Ok((0..self.dim)
                .map(|i| if i % 2 == 0 { mean } else { energy })
                .collect())
        }
    }

    #[test]
    fn test_extract_missing_label() {
        let manifest = Manifest::new(vec![AudioSample {
            audio_path: PathBuf::from("known.wav"),
            class: "male".to_string(),
        }])
        .unwrap();

        let model = StubModel::new(8);
        let err = extract(&model, &manifest, Path::new("other.wav"));
        assert!(matches!(err, Err(ExtractError::Manifest(_))));
    }

    #[test]
    fn test_stub_model_deterministic() {
        let audio = AudioData::from_interleaved(&[0.1, 0.2, 0.3, 0.4], 1, 16_000);
        let model = StubModel::new(8);

        let a = model.embed(&audio).unwrap();
        let b = model.embed(&audio).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }
}
