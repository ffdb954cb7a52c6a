//! Pretrained speaker-verification model via ONNX Runtime.

use std::path::Path;
use std::sync::Mutex;

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::{debug, info};

use super::{EmbeddingModel, ExtractError};
use crate::audio::AudioData;

/// Device the model is bound to for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    /// Pick CUDA when requested and compiled in, otherwise CPU
    pub fn detect(enable_cuda: bool) -> Self {
        if enable_cuda && cfg!(feature = "cuda") {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "CPU"),
            Self::Cuda => write!(f, "CUDA"),
        }
    }
}

/// Speaker-verification embedding model.
///
/// The ONNX session is created once, bound to a single device, and reused
/// for every file in the run. Input and output names are taken from the
/// model itself; the model is expected to map a `[1, samples]` mono f32
/// waveform to a `[1, dim]` embedding.
pub struct OnnxSpeakerModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    dimension: usize,
    device: Device,
}

impl std::fmt::Debug for OnnxSpeakerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSpeakerModel")
            .field("device", &self.device)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl OnnxSpeakerModel {
    /// Load the model from an ONNX file
    pub fn load(model_path: &Path, dimension: usize, device: Device) -> Result<Self, ExtractError> {
        info!(model = %model_path.display(), %device, "Loading speaker embedding model");

        let model_bytes = std::fs::read(model_path)?;

        let mut builder = Session::builder().map_err(|e| ExtractError::Onnx(e.to_string()))?;

        builder = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ExtractError::Onnx(e.to_string()))?;

        builder = builder
            .with_intra_threads(4)
            .map_err(|e| ExtractError::Onnx(e.to_string()))?;

        if device == Device::Cuda {
            #[cfg(feature = "cuda")]
            {
                use ort::execution_providers::CUDAExecutionProvider;
                builder = builder
                    .with_execution_providers([CUDAExecutionProvider::default().build()])
                    .map_err(|e| ExtractError::Onnx(e.to_string()))?;
            }
            #[cfg(not(feature = "cuda"))]
            {
                tracing::warn!("CUDA requested but not compiled with cuda feature, using CPU");
            }
        }

        let session = builder
            .commit_from_memory(&model_bytes)
            .map_err(|e| ExtractError::Onnx(format!("Failed to load model: {e}")))?;

        debug!(
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "Speaker model loaded"
        );

        let input_name = session.inputs()[0].name().to_string();
        let output_name = session.outputs()[0].name().to_string();

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            dimension,
            device,
        })
    }

    /// Device the model is bound to
    pub fn device(&self) -> Device {
        self.device
    }
}

impl EmbeddingModel for OnnxSpeakerModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, audio: &AudioData) -> Result<Vec<f32>, ExtractError> {
        // The model consumes a mono waveform; multi-channel audio is mixed
        // down from its channel-major layout.
        let mono = audio.to_mono();
        if mono.is_empty() {
            return Err(ExtractError::Decode("Empty audio input".to_string()));
        }

        let input = Tensor::from_array(([1usize, mono.len()], mono.into_boxed_slice()))
            .map_err(|e| ExtractError::Onnx(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ExtractError::Onnx(format!("Session lock error: {e}")))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| ExtractError::Onnx(e.to_string()))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ExtractError::Onnx(format!("Output '{}' not found", self.output_name))
        })?;

        // Embedding comes back as [1, dim]; move it to host memory
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractError::Onnx(e.to_string()))?;

        debug!(?shape, data_len = data.len(), "Embedding model output");

        if data.len() < self.dimension {
            return Err(ExtractError::DimensionMismatch {
                expected: self.dimension,
                got: data.len(),
            });
        }

        Ok(data[..self.dimension].to_vec())
    }
}
