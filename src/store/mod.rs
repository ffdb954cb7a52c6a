//! Vector storage for speaker embeddings.
//!
//! Two interchangeable backends persist `(id, vector, metadata)` records and
//! retrieve them filtered by split:
//! - usearch (embedded HNSW index with a bincode record sidecar)
//! - a flat bincode file keyed by split
//!
//! Record ids are deterministic, `{split}_{index}` in insertion order, so
//! re-storing the same split is idempotent and the two splits never collide.

mod flat_file;
mod usearch_store;

pub use flat_file::FlatFileStore;
pub use usearch_store::UsearchStore;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::embed::SampleEmbedding;

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid embedding dimension: expected {expected}, got {got}")]
    InvalidDimension { expected: usize, got: usize },

    #[error("Invalid split name: {0}")]
    InvalidSplit(String),

    #[error("Storage operation failed: {0}")]
    OperationFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dataset partition a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    /// Both splits, in canonical order
    pub const ALL: [Split; 2] = [Split::Train, Split::Test];
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Split {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => Err(StoreError::InvalidSplit(other.to_string())),
        }
    }
}

/// Metadata stored with each embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Path of the source audio file
    pub file_path: String,
    /// Raw class label
    pub label: String,
    /// Which split the record belongs to
    pub split: Split,
}

/// A persisted embedding with its id and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique id, `{split}_{index}`
    pub id: String,
    /// Embedding vector; dimension is identical across a collection
    pub vector: Vec<f32>,
    /// Per-sample metadata
    pub metadata: RecordMetadata,
}

impl EmbeddingRecord {
    /// Build the deterministic record id for a split and list position
    pub fn make_id(split: Split, index: usize) -> String {
        format!("{split}_{index}")
    }
}

/// A nearest-neighbor match from the index
#[derive(Debug, Clone)]
pub struct SearchMatch {
    /// Id of the matched record
    pub id: String,
    /// Similarity score (1 - cosine distance)
    pub score: f32,
    /// Metadata of the matched record
    pub metadata: RecordMetadata,
}

/// Synchronous store for embedding records.
///
/// The pipeline is an offline single-process batch job; all operations block.
pub trait EmbeddingStore {
    /// Persist a batch of embeddings under a split as one atomic write.
    ///
    /// Ids are assigned in list order; storing the same split again
    /// overwrites the previous records for that split.
    fn store(&mut self, split: Split, items: &[SampleEmbedding]) -> Result<(), StoreError>;

    /// Retrieve every record whose metadata split matches.
    ///
    /// Record order is store-defined and must not be relied on.
    fn retrieve(&self, split: Split) -> Result<Vec<EmbeddingRecord>, StoreError>;

    /// Number of records held across all splits
    fn count(&self) -> Result<usize, StoreError>;
}
