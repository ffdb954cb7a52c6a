//! usearch-based embedded vector storage.
//!
//! Vectors live in a usearch HNSW index for similarity search; the full
//! records (vector + metadata) live in a bincode sidecar so retrieval by
//! split returns the exact stored vectors. Both files sit under a
//! collection-named prefix in the data directory.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{EmbeddingRecord, EmbeddingStore, RecordMetadata, SearchMatch, Split, StoreError};
use crate::embed::SampleEmbedding;

/// On-disk sidecar holding records and the id -> index-key mapping
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    dimension: usize,
    records: HashMap<String, EmbeddingRecord>,
    id_keys: HashMap<String, u64>,
    next_key: u64,
}

/// File-based vector store using a usearch HNSW index
pub struct UsearchStore {
    data_dir: PathBuf,
    collection: String,
    dimension: usize,
    index: Index,
    records: HashMap<String, EmbeddingRecord>,
    id_keys: HashMap<String, u64>,
    next_key: u64,
    /// True once the collection exists on disk or in memory
    exists: bool,
}

impl std::fmt::Debug for UsearchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsearchStore")
            .field("data_dir", &self.data_dir)
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl UsearchStore {
    /// Open a collection in the given data directory, loading any existing
    /// index and records from disk.
    pub fn open(
        data_dir: impl Into<PathBuf>,
        collection: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        let collection = collection.into();

        info!(data_dir = %data_dir.display(), collection, "Opening usearch store");

        fs::create_dir_all(&data_dir)?;

        let options = IndexOptions {
            dimensions: dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            multi: false,
        };

        let index = Index::new(&options).map_err(|e| StoreError::OperationFailed(e.to_string()))?;

        let mut store = Self {
            data_dir,
            collection,
            dimension,
            index,
            records: HashMap::new(),
            id_keys: HashMap::new(),
            next_key: 0,
            exists: false,
        };

        store.load_from_disk()?;

        Ok(store)
    }

    fn index_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.usearch", self.collection))
    }

    fn sidecar_path(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}.records.bin", self.collection))
    }

    fn load_from_disk(&mut self) -> Result<(), StoreError> {
        let sidecar_path = self.sidecar_path();
        if !sidecar_path.exists() {
            return Ok(());
        }

        let data = fs::read(&sidecar_path)?;
        let sidecar: Sidecar = bincode::deserialize(&data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if sidecar.dimension != self.dimension {
            return Err(StoreError::InvalidDimension {
                expected: self.dimension,
                got: sidecar.dimension,
            });
        }

        let index_path = self.index_path();
        if index_path.exists() {
            self.index
                .load(index_path.to_string_lossy().as_ref())
                .map_err(|e| {
                    StoreError::OperationFailed(format!("Failed to load index: {e}"))
                })?;
        }

        info!(
            collection = self.collection,
            records = sidecar.records.len(),
            "Loaded collection from disk"
        );

        self.records = sidecar.records;
        self.id_keys = sidecar.id_keys;
        self.next_key = sidecar.next_key;
        self.exists = true;

        Ok(())
    }

    fn save_to_disk(&self) -> Result<(), StoreError> {
        let index_path_str = self.index_path().to_string_lossy().into_owned();
        self.index
            .save(&index_path_str)
            .map_err(|e| StoreError::OperationFailed(format!("Failed to save index: {e}")))?;

        let sidecar = Sidecar {
            dimension: self.dimension,
            records: self.records.clone(),
            id_keys: self.id_keys.clone(),
            next_key: self.next_key,
        };
        let data = bincode::serialize(&sidecar)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(self.sidecar_path(), data)?;

        debug!(collection = self.collection, index_path = %index_path_str, "Saved to disk");
        Ok(())
    }

    fn key_for(&mut self, id: &str) -> u64 {
        if let Some(&key) = self.id_keys.get(id) {
            return key;
        }
        let key = self.next_key;
        self.next_key += 1;
        self.id_keys.insert(id.to_string(), key);
        key
    }

    /// Nearest-neighbor search over all stored vectors (cosine similarity)
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchMatch>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::InvalidDimension {
                expected: self.dimension,
                got: query.len(),
            });
        }

        let results = self
            .index
            .search(query, limit)
            .map_err(|e| StoreError::OperationFailed(e.to_string()))?;

        let reverse: HashMap<u64, &String> =
            self.id_keys.iter().map(|(id, &key)| (key, id)).collect();

        Ok(results
            .keys
            .into_iter()
            .zip(results.distances)
            .filter_map(|(key, distance)| {
                let id = reverse.get(&key)?;
                let record = self.records.get(*id)?;
                Some(SearchMatch {
                    id: (*id).clone(),
                    score: 1.0 - distance,
                    metadata: record.metadata.clone(),
                })
            })
            .collect())
    }
}

impl EmbeddingStore for UsearchStore {
    fn store(&mut self, split: Split, items: &[SampleEmbedding]) -> Result<(), StoreError> {
        for item in items {
            if item.vector.len() != self.dimension {
                return Err(StoreError::InvalidDimension {
                    expected: self.dimension,
                    got: item.vector.len(),
                });
            }
        }

        // Drop any previous records for this split so re-storing a split
        // replaces it wholesale.
        let stale: Vec<String> = self
            .records
            .values()
            .filter(|r| r.metadata.split == split)
            .map(|r| r.id.clone())
            .collect();
        for id in stale {
            if let Some(key) = self.id_keys.get(&id) {
                let _ = self.index.remove(*key);
            }
            self.records.remove(&id);
        }

        self.index
            .reserve(self.records.len() + items.len())
            .map_err(|e| StoreError::OperationFailed(e.to_string()))?;

        for (i, item) in items.iter().enumerate() {
            let id = EmbeddingRecord::make_id(split, i);
            let key = self.key_for(&id);

            let _ = self.index.remove(key);
            self.index
                .add(key, &item.vector)
                .map_err(|e| StoreError::OperationFailed(e.to_string()))?;

            self.records.insert(
                id.clone(),
                EmbeddingRecord {
                    id,
                    vector: item.vector.clone(),
                    metadata: RecordMetadata {
                        file_path: item.file_path.clone(),
                        label: item.label.clone(),
                        split,
                    },
                },
            );
        }

        self.exists = true;
        self.save_to_disk()?;

        debug!(collection = self.collection, %split, count = items.len(), "Stored embeddings");
        Ok(())
    }

    fn retrieve(&self, split: Split) -> Result<Vec<EmbeddingRecord>, StoreError> {
        if !self.exists {
            return Err(StoreError::CollectionNotFound(self.collection.clone()));
        }

        Ok(self
            .records
            .values()
            .filter(|r| r.metadata.split == split)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str, label: &str, vector: Vec<f32>) -> SampleEmbedding {
        SampleEmbedding {
            file_path: path.to_string(),
            label: label.to_string(),
            vector,
        }
    }

    #[test]
    fn test_store_and_retrieve_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UsearchStore::open(dir.path(), "speakers", 4).unwrap();

        let items = vec![
            sample("a.wav", "male", vec![1.0, 0.0, 0.0, 0.0]),
            sample("b.wav", "female", vec![0.0, 1.0, 0.0, 0.0]),
        ];
        store.store(Split::Train, &items).unwrap();

        let records = store.retrieve(Split::Train).unwrap();
        assert_eq!(records.len(), 2);

        for record in &records {
            let original = items
                .iter()
                .find(|i| i.file_path == record.metadata.file_path)
                .unwrap();
            assert_eq!(record.vector, original.vector);
            assert_eq!(record.metadata.label, original.label);
            assert_eq!(record.metadata.split, Split::Train);
        }
    }

    #[test]
    fn test_split_filtering_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UsearchStore::open(dir.path(), "speakers", 2).unwrap();

        store
            .store(Split::Train, &[sample("a.wav", "male", vec![1.0, 0.0])])
            .unwrap();
        store
            .store(
                Split::Test,
                &[
                    sample("b.wav", "female", vec![0.0, 1.0]),
                    sample("c.wav", "male", vec![0.5, 0.5]),
                ],
            )
            .unwrap();

        let train = store.retrieve(Split::Train).unwrap();
        assert_eq!(train.len(), 1);
        assert!(train.iter().all(|r| r.metadata.split == Split::Train));

        let test = store.retrieve(Split::Test).unwrap();
        assert_eq!(test.len(), 2);
        assert!(test.iter().all(|r| r.metadata.split == Split::Test));
    }

    #[test]
    fn test_retrieve_missing_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsearchStore::open(dir.path(), "nothing_here", 4).unwrap();

        let err = store.retrieve(Split::Train);
        assert!(matches!(err, Err(StoreError::CollectionNotFound(_))));
    }

    #[test]
    fn test_restore_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UsearchStore::open(dir.path(), "speakers", 2).unwrap();

        let items = vec![sample("a.wav", "male", vec![1.0, 0.0])];
        store.store(Split::Train, &items).unwrap();
        store.store(Split::Train, &items).unwrap();

        let records = store.retrieve(Split::Train).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "train_0");
    }

    #[test]
    fn test_dimension_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UsearchStore::open(dir.path(), "speakers", 4).unwrap();

        let err = store.store(Split::Train, &[sample("a.wav", "male", vec![1.0])]);
        assert!(matches!(err, Err(StoreError::InvalidDimension { .. })));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut store = UsearchStore::open(dir.path(), "speakers", 2).unwrap();
            store
                .store(Split::Train, &[sample("a.wav", "male", vec![0.25, 0.75])])
                .unwrap();
        }

        let store = UsearchStore::open(dir.path(), "speakers", 2).unwrap();
        let records = store.retrieve(Split::Train).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vector, vec![0.25, 0.75]);
        assert_eq!(records[0].metadata.label, "male");
    }

    #[test]
    fn test_search_returns_nearest() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UsearchStore::open(dir.path(), "speakers", 2).unwrap();

        store
            .store(
                Split::Train,
                &[
                    sample("a.wav", "male", vec![1.0, 0.0]),
                    sample("b.wav", "female", vec![0.0, 1.0]),
                ],
            )
            .unwrap();

        let matches = store.search(&[0.9, 0.1], 1).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].metadata.label, "male");
    }
}
