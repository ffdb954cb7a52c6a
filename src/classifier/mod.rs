//! Feed-forward classifier over speaker embeddings.
//!
//! A two-layer network trained with mini-batch cross-entropy and an
//! Adam-style optimizer, evaluated with weighted precision/recall/F1.

mod eval;
mod model;
mod train;

pub use eval::{evaluate, write_report, Evaluation, Metrics};
pub use model::Classifier;
pub use train::train;

use candle_core::Device;

use crate::dataset::DatasetError;

/// Training and evaluation error types
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Cannot evaluate an empty batch set")]
    EmptyDataset,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pick the compute device once per run: accelerator if available and
/// requested, otherwise CPU.
pub fn select_device(enable_cuda: bool) -> Result<Device, TrainError> {
    if enable_cuda {
        Ok(Device::cuda_if_available(0)?)
    } else {
        Ok(Device::Cpu)
    }
}
