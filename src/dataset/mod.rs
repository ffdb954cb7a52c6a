//! Dataset adapter: stored records -> batched tensors.
//!
//! Label encoding is a single bijection shared across splits: the encoder is
//! fit once over the union of all labels in the run and injected into every
//! split load, so integer labels are comparable between train and test.

use std::collections::BTreeMap;

use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::store::EmbeddingRecord;

/// Dataset error types
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("Label not present in the fitted encoder: {0}")]
    UnknownLabel(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Bijection between raw label strings and contiguous integers.
///
/// Classes are assigned in sorted order, so fitting the same label set always
/// produces the same mapping regardless of input order.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    index: BTreeMap<String, u32>,
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit an encoder over a set of raw labels
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = labels
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect();
        classes.sort_unstable();
        classes.dedup();

        let index = classes
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i as u32))
            .collect();

        Self { index, classes }
    }

    /// Encode a raw label; the label must have been seen during fit
    pub fn encode(&self, label: &str) -> Result<u32, DatasetError> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| DatasetError::UnknownLabel(label.to_string()))
    }

    /// Decode an integer back to its raw label
    pub fn decode(&self, value: u32) -> Option<&str> {
        self.classes.get(value as usize).map(String::as_str)
    }

    /// Class labels in encoding order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of distinct classes
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

/// In-memory dataset of stacked embedding vectors with integer labels.
///
/// Constructed once per training or evaluation run and dropped when the run
/// ends; nothing here persists.
#[derive(Debug)]
pub struct EmbeddingDataset {
    /// Row-major `[len, dim]` matrix
    vectors: Vec<f32>,
    labels: Vec<u32>,
    dim: usize,
    len: usize,
}

impl EmbeddingDataset {
    /// Build a dataset from stored records using a pre-fitted encoder
    pub fn from_records(
        records: &[EmbeddingRecord],
        encoder: &LabelEncoder,
    ) -> Result<Self, DatasetError> {
        let first = records.first().ok_or(DatasetError::EmptyDataset)?;
        let dim = first.vector.len();

        let mut vectors = Vec::with_capacity(records.len() * dim);
        let mut labels = Vec::with_capacity(records.len());

        for record in records {
            if record.vector.len() != dim {
                return Err(DatasetError::DimensionMismatch {
                    expected: dim,
                    got: record.vector.len(),
                });
            }
            vectors.extend_from_slice(&record.vector);
            labels.push(encoder.encode(&record.metadata.label)?);
        }

        debug!(len = records.len(), dim, "Dataset built");

        Ok(Self {
            vectors,
            labels,
            dim,
            len: records.len(),
        })
    }

    /// Build a dataset directly from vectors and integer labels
    pub fn from_parts(vectors: Vec<Vec<f32>>, labels: Vec<u32>) -> Result<Self, DatasetError> {
        let first = vectors.first().ok_or(DatasetError::EmptyDataset)?;
        let dim = first.len();
        let len = vectors.len();

        let mut flat = Vec::with_capacity(len * dim);
        for v in &vectors {
            if v.len() != dim {
                return Err(DatasetError::DimensionMismatch {
                    expected: dim,
                    got: v.len(),
                });
            }
            flat.extend_from_slice(v);
        }

        Ok(Self {
            vectors: flat,
            labels,
            dim,
            len,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the dataset holds no samples
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Embedding dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Integer labels in dataset order
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Sequential fixed-order batches (evaluation)
    pub fn batches<'a>(&'a self, batch_size: usize, device: &'a Device) -> Batches<'a> {
        Batches {
            dataset: self,
            order: (0..self.len).collect(),
            batch_size: batch_size.max(1),
            pos: 0,
            device,
        }
    }

    /// Freshly shuffled batches; call once per epoch (training)
    pub fn shuffled_batches<'a, R: Rng>(
        &'a self,
        batch_size: usize,
        device: &'a Device,
        rng: &mut R,
    ) -> Batches<'a> {
        let mut order: Vec<usize> = (0..self.len).collect();
        order.shuffle(rng);
        Batches {
            dataset: self,
            order,
            batch_size: batch_size.max(1),
            pos: 0,
            device,
        }
    }
}

/// Finite iterator over `(vectors, labels)` tensor batches.
///
/// The final batch may be smaller than the configured size.
pub struct Batches<'a> {
    dataset: &'a EmbeddingDataset,
    order: Vec<usize>,
    batch_size: usize,
    pos: usize,
    device: &'a Device,
}

impl Iterator for Batches<'_> {
    type Item = Result<(Tensor, Tensor), DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }

        let end = (self.pos + self.batch_size).min(self.order.len());
        let indices = &self.order[self.pos..end];
        self.pos = end;

        let dim = self.dataset.dim;
        let mut flat = Vec::with_capacity(indices.len() * dim);
        let mut labels = Vec::with_capacity(indices.len());
        for &i in indices {
            flat.extend_from_slice(&self.dataset.vectors[i * dim..(i + 1) * dim]);
            labels.push(self.dataset.labels[i]);
        }

        let rows = indices.len();
        let batch = Tensor::from_vec(flat, (rows, dim), self.device)
            .and_then(|xs| Tensor::from_vec(labels, rows, self.device).map(|ys| (xs, ys)));

        Some(batch.map_err(DatasetError::Tensor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RecordMetadata, Split};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn record(label: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: String::new(),
            vector,
            metadata: RecordMetadata {
                file_path: String::new(),
                label: label.to_string(),
                split: Split::Train,
            },
        }
    }

    #[test]
    fn test_encoder_is_a_bijection() {
        let encoder = LabelEncoder::fit(["male", "female", "male", "female"]);

        assert_eq!(encoder.num_classes(), 2);
        for label in ["male", "female"] {
            let code = encoder.encode(label).unwrap();
            assert_eq!(encoder.decode(code).unwrap(), label);
        }
    }

    #[test]
    fn test_encoder_order_independent() {
        let a = LabelEncoder::fit(["male", "female"]);
        let b = LabelEncoder::fit(["female", "male"]);
        assert_eq!(a.classes(), b.classes());
        assert_eq!(a.encode("male").unwrap(), b.encode("male").unwrap());
    }

    #[test]
    fn test_encoder_unknown_label() {
        let encoder = LabelEncoder::fit(["male", "female"]);
        let err = encoder.encode("child");
        assert!(matches!(err, Err(DatasetError::UnknownLabel(_))));
    }

    #[test]
    fn test_empty_dataset_is_error() {
        let encoder = LabelEncoder::fit(["male"]);
        let err = EmbeddingDataset::from_records(&[], &encoder);
        assert!(matches!(err, Err(DatasetError::EmptyDataset)));
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let encoder = LabelEncoder::fit(["male", "female"]);
        let err = EmbeddingDataset::from_records(
            &[
                record("male", vec![1.0, 2.0]),
                record("female", vec![1.0]),
            ],
            &encoder,
        );
        assert!(matches!(err, Err(DatasetError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_batches_cover_dataset_with_short_tail() {
        let encoder = LabelEncoder::fit(["a"]);
        let records: Vec<EmbeddingRecord> =
            (0..10).map(|i| record("a", vec![i as f32, 0.0])).collect();
        let dataset = EmbeddingDataset::from_records(&records, &encoder).unwrap();

        let device = Device::Cpu;
        let sizes: Vec<usize> = dataset
            .batches(4, &device)
            .map(|b| b.unwrap().0.dim(0).unwrap())
            .collect();

        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_batches_restartable() {
        let encoder = LabelEncoder::fit(["a"]);
        let records: Vec<EmbeddingRecord> =
            (0..6).map(|i| record("a", vec![i as f32])).collect();
        let dataset = EmbeddingDataset::from_records(&records, &encoder).unwrap();

        let device = Device::Cpu;
        for _ in 0..3 {
            let total: usize = dataset
                .batches(4, &device)
                .map(|b| b.unwrap().0.dim(0).unwrap())
                .sum();
            assert_eq!(total, 6);
        }
    }

    #[test]
    fn test_shuffled_batches_permute_labels() {
        let encoder = LabelEncoder::fit(["a", "b"]);
        let records: Vec<EmbeddingRecord> = (0..32)
            .map(|i| record(if i < 16 { "a" } else { "b" }, vec![i as f32]))
            .collect();
        let dataset = EmbeddingDataset::from_records(&records, &encoder).unwrap();

        let device = Device::Cpu;
        let mut rng = StdRng::seed_from_u64(7);
        let (_, ys) = dataset
            .shuffled_batches(32, &device, &mut rng)
            .next()
            .unwrap()
            .unwrap();
        let labels = ys.to_vec1::<u32>().unwrap();

        // Same multiset of labels, no longer sorted
        let mut sorted = labels.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, dataset.labels().to_vec());
        assert_ne!(labels, sorted);
    }
}
