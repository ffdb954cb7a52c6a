//! Evaluation loop and aggregate metrics.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use candle_core::{Device, D};
use tracing::info;

use super::{Classifier, TrainError};
use crate::dataset::EmbeddingDataset;

/// Aggregate classification metrics, all in [0, 1].
///
/// Precision, recall, and F1 are averaged across classes weighted by class
/// support; per-class terms with a zero denominator contribute zero rather
/// than NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

/// Evaluation output: metrics plus the per-sample data needed for
/// visualization.
#[derive(Debug)]
pub struct Evaluation {
    pub metrics: Metrics,
    /// Argmax predictions in dataset order
    pub predictions: Vec<u32>,
    /// True labels in dataset order
    pub truths: Vec<u32>,
    /// Pre-dropout hidden representation of every sample
    pub hidden: Vec<Vec<f32>>,
}

/// Run inference over the dataset in a fixed batch order and compute
/// aggregate metrics. Dropout is disabled and no gradients are tracked.
pub fn evaluate(
    model: &Classifier,
    dataset: &EmbeddingDataset,
    batch_size: usize,
    device: &Device,
) -> Result<Evaluation, TrainError> {
    if dataset.is_empty() {
        return Err(TrainError::EmptyDataset);
    }

    let mut predictions = Vec::with_capacity(dataset.len());
    let mut truths = Vec::with_capacity(dataset.len());
    let mut hidden = Vec::with_capacity(dataset.len());

    for batch in dataset.batches(batch_size, device) {
        let (xs, ys) = batch?;

        let (batch_hidden, logits) = model.forward(&xs, false)?;

        predictions.extend(logits.argmax(D::Minus1)?.to_vec1::<u32>()?);
        truths.extend(ys.to_vec1::<u32>()?);
        hidden.extend(batch_hidden.detach().to_vec2::<f32>()?);
    }

    let metrics = compute_metrics(&predictions, &truths);

    info!(
        accuracy = metrics.accuracy,
        precision = metrics.precision,
        recall = metrics.recall,
        f1 = metrics.f1,
        samples = truths.len(),
        "Evaluation complete"
    );

    Ok(Evaluation {
        metrics,
        predictions,
        truths,
        hidden,
    })
}

/// Weighted-average metrics over accumulated predictions and truths
fn compute_metrics(predictions: &[u32], truths: &[u32]) -> Metrics {
    let total = truths.len();

    let correct = predictions
        .iter()
        .zip(truths.iter())
        .filter(|(p, t)| p == t)
        .count();
    let accuracy = correct as f32 / total as f32;

    // Per-class counts over the union of classes seen in either side
    let mut support: BTreeMap<u32, usize> = BTreeMap::new();
    let mut true_positive: BTreeMap<u32, usize> = BTreeMap::new();
    let mut predicted: BTreeMap<u32, usize> = BTreeMap::new();

    for (&p, &t) in predictions.iter().zip(truths.iter()) {
        *support.entry(t).or_default() += 1;
        *predicted.entry(p).or_default() += 1;
        if p == t {
            *true_positive.entry(t).or_default() += 1;
        }
    }

    let mut precision = 0.0f32;
    let mut recall = 0.0f32;
    let mut f1 = 0.0f32;

    for (&class, &class_support) in &support {
        let tp = true_positive.get(&class).copied().unwrap_or(0) as f32;
        let pred = predicted.get(&class).copied().unwrap_or(0) as f32;

        // Zero-division-safe: a class never predicted (or never true)
        // contributes zero to the corresponding term.
        let class_precision = if pred > 0.0 { tp / pred } else { 0.0 };
        let class_recall = tp / class_support as f32;
        let class_f1 = if class_precision + class_recall > 0.0 {
            2.0 * class_precision * class_recall / (class_precision + class_recall)
        } else {
            0.0
        };

        let weight = class_support as f32 / total as f32;
        precision += weight * class_precision;
        recall += weight * class_recall;
        f1 += weight * class_f1;
    }

    Metrics {
        accuracy,
        precision,
        recall,
        f1,
    }
}

/// Write metrics as a flat text report, one `metric_name: value` per line
pub fn write_report(path: &Path, metrics: &Metrics) -> Result<(), TrainError> {
    let report = format!(
        "accuracy: {:.4}\nprecision: {:.4}\nrecall: {:.4}\nf1: {:.4}\n",
        metrics.accuracy, metrics.precision, metrics.recall, metrics.f1
    );
    fs::write(path, report)?;

    info!(report = %path.display(), "Metrics report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let truths = vec![0, 1, 2, 0, 1, 2];
        let metrics = compute_metrics(&truths, &truths);

        assert!((metrics.accuracy - 1.0).abs() < 1e-6);
        assert!((metrics.precision - 1.0).abs() < 1e-6);
        assert!((metrics.recall - 1.0).abs() < 1e-6);
        assert!((metrics.f1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_metrics_in_unit_interval() {
        let predictions = vec![0, 0, 1, 2, 1, 0];
        let truths = vec![0, 1, 1, 0, 2, 2];
        let metrics = compute_metrics(&predictions, &truths);

        for value in [
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.f1,
        ] {
            assert!((0.0..=1.0).contains(&value), "metric {value} out of range");
            assert!(!value.is_nan());
        }
    }

    #[test]
    fn test_missing_class_in_predictions_does_not_crash() {
        // Class 2 is present in truths but never predicted
        let predictions = vec![0, 0, 1, 1];
        let truths = vec![0, 2, 1, 2];
        let metrics = compute_metrics(&predictions, &truths);

        assert!(!metrics.precision.is_nan());
        assert!(!metrics.recall.is_nan());
        assert!(!metrics.f1.is_nan());
        assert!((metrics.accuracy - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_recall() {
        // Class 0: support 3, all correct; class 1: support 1, wrong
        let predictions = vec![0, 0, 0, 0];
        let truths = vec![0, 0, 0, 1];
        let metrics = compute_metrics(&predictions, &truths);

        assert!((metrics.recall - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input_fails_before_evaluation() {
        use crate::dataset::{DatasetError, EmbeddingDataset};

        // An empty batch set is rejected when the dataset is built, so
        // evaluation can never silently return NaN metrics.
        let err = EmbeddingDataset::from_parts(vec![], vec![]);
        assert!(matches!(err, Err(DatasetError::EmptyDataset)));
    }

    #[test]
    fn test_report_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");

        write_report(
            &path,
            &Metrics {
                accuracy: 0.95,
                precision: 0.9,
                recall: 0.85,
                f1: 0.875,
            },
        )
        .unwrap();

        let report = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "accuracy: 0.9500");
        assert!(lines.iter().all(|l| l.contains(": ")));
    }
}
