//! Mini-batch training loop.

use candle_core::Device;
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW};
use rand::Rng;
use tracing::info;

use super::{Classifier, TrainError};
use crate::dataset::EmbeddingDataset;

/// Train the classifier in place.
///
/// Each epoch draws the batches in a freshly shuffled order, computes
/// cross-entropy against the integer labels, and applies one AdamW step with
/// default hyperparameters per batch. Loss and gradients are f32 throughout.
/// There is no checkpointing; an interrupted run loses all progress.
pub fn train<R: Rng>(
    model: &Classifier,
    dataset: &EmbeddingDataset,
    batch_size: usize,
    epochs: usize,
    device: &Device,
    rng: &mut R,
) -> Result<(), TrainError> {
    let mut optimizer = AdamW::new(model.varmap().all_vars(), ParamsAdamW::default())?;

    for epoch in 0..epochs {
        let mut epoch_loss = 0.0f32;
        let mut batches = 0usize;

        for batch in dataset.shuffled_batches(batch_size, device, rng) {
            let (xs, ys) = batch?;

            let (_, logits) = model.forward(&xs, true)?;
            let loss = loss::cross_entropy(&logits, &ys)?;

            // backward_step computes gradients, applies one update, and
            // resets the gradients.
            optimizer.backward_step(&loss)?;

            epoch_loss += loss.to_scalar::<f32>()?;
            batches += 1;
        }

        if epoch % 10 == 0 || epoch + 1 == epochs {
            info!(
                epoch,
                avg_loss = epoch_loss / batches.max(1) as f32,
                "Epoch complete"
            );
        }
    }

    info!(epochs, samples = dataset.len(), "Training complete");
    Ok(())
}
