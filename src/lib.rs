//! Speaker-embedding classification pipeline.
//!
//! An offline experiment pipeline: extract fixed-length speaker embeddings
//! from audio files with a pretrained ONNX speaker-verification model, store
//! them with per-sample metadata in an embedded vector store, then train and
//! evaluate a small feed-forward classifier (age/gender style labels) on the
//! stored vectors.

pub mod audio;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod embed;
pub mod error;
pub mod manifest;
pub mod store;
pub mod viz;

pub use config::AppConfig;
pub use error::{PipelineError, Result};

pub use audio::{AudioData, AudioDecoder};
pub use embed::{EmbeddingModel, SampleEmbedding};
pub use store::{EmbeddingRecord, EmbeddingStore, RecordMetadata, Split};
