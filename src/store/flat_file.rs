//! Flat-file embedding storage.
//!
//! Persists all records as a single bincode file keyed by split. This is the
//! simple alternative to the vector store; both backends yield the same
//! logical records.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use super::{EmbeddingRecord, EmbeddingStore, RecordMetadata, Split, StoreError};
use crate::embed::SampleEmbedding;

/// Single-file store keyed by split
pub struct FlatFileStore {
    path: PathBuf,
    splits: HashMap<Split, Vec<EmbeddingRecord>>,
    exists: bool,
}

impl std::fmt::Debug for FlatFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatFileStore")
            .field("path", &self.path)
            .finish()
    }
}

impl FlatFileStore {
    /// Open a flat-file store, loading existing records if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let (splits, exists) = if path.exists() {
            let data = fs::read(&path)?;
            let splits: HashMap<Split, Vec<EmbeddingRecord>> = bincode::deserialize(&data)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            info!(path = %path.display(), "Loaded flat-file store");
            (splits, true)
        } else {
            (HashMap::new(), false)
        };

        Ok(Self {
            path,
            splits,
            exists,
        })
    }

    fn save_to_disk(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = bincode::serialize(&self.splits)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&self.path, data)?;

        debug!(path = %self.path.display(), "Saved flat-file store");
        Ok(())
    }
}

impl EmbeddingStore for FlatFileStore {
    fn store(&mut self, split: Split, items: &[SampleEmbedding]) -> Result<(), StoreError> {
        // Dimension is identical across the whole collection, so incoming
        // vectors are checked against the other splits already held, not
        // just within this batch.
        let dim = self
            .splits
            .iter()
            .filter(|(s, _)| **s != split)
            .flat_map(|(_, records)| records.first())
            .map(|r| r.vector.len())
            .next()
            .or_else(|| items.first().map(|i| i.vector.len()));

        if let Some(dim) = dim {
            for item in items {
                if item.vector.len() != dim {
                    return Err(StoreError::InvalidDimension {
                        expected: dim,
                        got: item.vector.len(),
                    });
                }
            }
        }

        let records: Vec<EmbeddingRecord> = items
            .iter()
            .enumerate()
            .map(|(i, item)| EmbeddingRecord {
                id: EmbeddingRecord::make_id(split, i),
                vector: item.vector.clone(),
                metadata: RecordMetadata {
                    file_path: item.file_path.clone(),
                    label: item.label.clone(),
                    split,
                },
            })
            .collect();

        self.splits.insert(split, records);
        self.exists = true;
        self.save_to_disk()?;

        debug!(path = %self.path.display(), %split, count = items.len(), "Stored embeddings");
        Ok(())
    }

    fn retrieve(&self, split: Split) -> Result<Vec<EmbeddingRecord>, StoreError> {
        if !self.exists {
            return Err(StoreError::CollectionNotFound(
                self.path.to_string_lossy().into_owned(),
            ));
        }

        Ok(self.splits.get(&split).cloned().unwrap_or_default())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.splits.values().map(Vec::len).sum())
    }
}
