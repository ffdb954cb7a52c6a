//! Two-layer feed-forward classifier.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, Dropout, Linear, Module, VarBuilder, VarMap};

use super::TrainError;

/// Linear D -> hidden, ReLU, dropout on the hidden activation (training
/// only), linear hidden -> num_classes. Purely a function of its parameters
/// and input; training vs inference is an explicit argument, not module
/// state.
pub struct Classifier {
    fc1: Linear,
    fc2: Linear,
    dropout: Dropout,
    varmap: VarMap,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier").finish()
    }
}

impl Classifier {
    /// Build a classifier with freshly initialized parameters
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        num_classes: usize,
        dropout: f32,
        device: &Device,
    ) -> Result<Self, TrainError> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let fc1 = linear(input_dim, hidden_dim, vb.pp("fc1"))?;
        let fc2 = linear(hidden_dim, num_classes, vb.pp("fc2"))?;

        Ok(Self {
            fc1,
            fc2,
            dropout: Dropout::new(dropout),
            varmap,
        })
    }

    /// Forward pass returning the pre-dropout hidden representation (for
    /// visualization) and the raw class logits.
    pub fn forward(&self, xs: &Tensor, train: bool) -> Result<(Tensor, Tensor), TrainError> {
        let hidden = self.fc1.forward(xs)?.relu()?;
        let dropped = self.dropout.forward(&hidden, train)?;
        let logits = self.fc2.forward(&dropped)?;
        Ok((hidden, logits))
    }

    /// All trainable parameters, mutated in place by the optimizer
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Serialize the whole model's weights to a safetensors checkpoint
    pub fn save(&self, path: &Path) -> Result<(), TrainError> {
        self.varmap.save(path)?;
        Ok(())
    }

    /// Load weights from a checkpoint into this model's parameters
    pub fn load(&mut self, path: &Path) -> Result<(), TrainError> {
        self.varmap.load(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shapes() {
        let device = Device::Cpu;
        let model = Classifier::new(16, 128, 4, 0.25, &device).unwrap();

        let xs = Tensor::zeros((8, 16), DType::F32, &device).unwrap();
        let (hidden, logits) = model.forward(&xs, false).unwrap();

        assert_eq!(hidden.dims(), &[8, 128]);
        assert_eq!(logits.dims(), &[8, 4]);
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        let device = Device::Cpu;
        let model = Classifier::new(4, 8, 2, 0.25, &device).unwrap();

        let xs = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], (1, 4), &device).unwrap();
        let (_, a) = model.forward(&xs, false).unwrap();
        let (_, b) = model.forward(&xs, false).unwrap();

        assert_eq!(
            a.to_vec2::<f32>().unwrap(),
            b.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let device = Device::Cpu;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let model = Classifier::new(4, 8, 2, 0.25, &device).unwrap();
        let xs = Tensor::from_vec(vec![0.5f32, -0.5, 1.0, 0.0], (1, 4), &device).unwrap();
        let (_, before) = model.forward(&xs, false).unwrap();
        model.save(&path).unwrap();

        let mut restored = Classifier::new(4, 8, 2, 0.25, &device).unwrap();
        restored.load(&path).unwrap();
        let (_, after) = restored.forward(&xs, false).unwrap();

        let before = before.to_vec2::<f32>().unwrap();
        let after = after.to_vec2::<f32>().unwrap();
        for (row_a, row_b) in before.iter().zip(after.iter()) {
            for (a, b) in row_a.iter().zip(row_b.iter()) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }
}
