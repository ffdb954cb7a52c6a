//! CSV dataset manifests.
//!
//! Each split is listed in a CSV file with `audio_path` and `class` columns.
//! The manifest builds a path -> label map up front so label lookup during
//! extraction is exact: duplicate paths are rejected at construction and a
//! missing path is an error rather than a silent fallback.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Manifest error types
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Duplicate audio path in manifest: {0}")]
    DuplicatePath(PathBuf),

    #[error("No label found for audio path: {0}")]
    LabelNotFound(PathBuf),

    #[error("Manifest is empty: {0}")]
    Empty(PathBuf),
}

/// One row of a dataset manifest
#[derive(Debug, Clone, Deserialize)]
pub struct AudioSample {
    /// Path to the audio file
    pub audio_path: PathBuf,
    /// Raw class label, e.g. "male" / "female"
    pub class: String,
}

/// A split's sample list with an exact path -> label lookup
#[derive(Debug, Clone)]
pub struct Manifest {
    samples: Vec<AudioSample>,
    labels: HashMap<PathBuf, String>,
}

impl Manifest {
    /// Load a manifest from a CSV file with `audio_path` and `class` columns
    pub fn from_csv(path: &Path) -> Result<Self, ManifestError> {
        let mut reader = csv::Reader::from_path(path)?;

        let mut samples = Vec::new();
        for row in reader.deserialize() {
            let sample: AudioSample = row?;
            samples.push(sample);
        }

        if samples.is_empty() {
            return Err(ManifestError::Empty(path.to_path_buf()));
        }

        debug!(manifest = %path.display(), samples = samples.len(), "Manifest loaded");
        Self::new(samples)
    }

    /// Build a manifest from an in-memory sample list
    pub fn new(samples: Vec<AudioSample>) -> Result<Self, ManifestError> {
        let mut labels = HashMap::with_capacity(samples.len());
        for sample in &samples {
            if labels
                .insert(sample.audio_path.clone(), sample.class.clone())
                .is_some()
            {
                return Err(ManifestError::DuplicatePath(sample.audio_path.clone()));
            }
        }

        Ok(Self { samples, labels })
    }

    /// Samples in manifest order
    pub fn samples(&self) -> &[AudioSample] {
        &self.samples
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the manifest holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Look up the label for an audio path; exactly one match must exist
    pub fn label_for(&self, path: &Path) -> Result<&str, ManifestError> {
        self.labels
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| ManifestError::LabelNotFound(path.to_path_buf()))
    }

    /// Distinct raw labels present in this manifest
    pub fn distinct_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.labels.values().map(String::as_str).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}
