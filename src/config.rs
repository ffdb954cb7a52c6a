use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// All settings can be configured via environment variables with the
/// `VOXCLASS_` prefix and double underscores for nested values:
/// - `VOXCLASS_MODEL__PATH` -> model.path
/// - `VOXCLASS_MODEL__ENABLE_CUDA` -> model.enable_cuda
/// - `VOXCLASS_TRAINING__EPOCHS` -> training.epochs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Embedding model configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Classifier training configuration
    #[serde(default)]
    pub training: TrainingConfig,

    /// Vector store configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path to the pretrained speaker-verification ONNX model
    #[serde(default = "default_model_path")]
    pub path: String,

    /// Output dimension of the embedding model
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Enable CUDA acceleration (requires the `cuda` feature)
    #[serde(default)]
    pub enable_cuda: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            embedding_dim: default_embedding_dim(),
            enable_cuda: false,
        }
    }
}

fn default_model_path() -> String {
    "./models/speaker_embedding.onnx".to_string()
}

fn default_embedding_dim() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Mini-batch size for training and evaluation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of training epochs
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Hidden layer width of the classifier
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,

    /// Dropout probability applied to the hidden activation during training
    #[serde(default = "default_dropout")]
    pub dropout: f32,

    /// RNG seed for batch shuffling
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            hidden_dim: default_hidden_dim(),
            dropout: default_dropout(),
            seed: default_seed(),
        }
    }
}

fn default_batch_size() -> usize {
    32
}

fn default_epochs() -> usize {
    50
}

fn default_hidden_dim() -> usize {
    128
}

fn default_dropout() -> f32 {
    0.25
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for vector store files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Collection name for speaker embeddings
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            collection: default_collection(),
        }
    }
}

fn default_data_dir() -> String {
    "./embeddings".to_string()
}

fn default_collection() -> String {
    "speaker_embeddings".to_string()
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("VOXCLASS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
