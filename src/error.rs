use thiserror::Error;

use crate::classifier::TrainError;
use crate::dataset::DatasetError;
use crate::embed::ExtractError;
use crate::manifest::ManifestError;
use crate::store::StoreError;
use crate::viz::VizError;

/// Top-level pipeline errors.
///
/// Every stage surfaces its failure immediately to the caller; there are no
/// retries and no partial-batch recovery. A failed extraction or load aborts
/// the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Training error: {0}")]
    Train(#[from] TrainError),

    #[error("Visualization error: {0}")]
    Viz(#[from] VizError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
