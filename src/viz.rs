//! 2D visualization of the learned representation.
//!
//! Projects hidden activations to two dimensions with Barnes-Hut t-SNE and
//! renders a labeled scatter plot, one color per class, to a PNG file.

use std::collections::BTreeMap;
use std::path::Path;

use plotters::prelude::*;
use tracing::info;

/// Visualization error types
#[derive(Debug, thiserror::Error)]
pub enum VizError {
    #[error("Projection requires at least 4 samples, got {0}")]
    TooFewSamples(usize),

    #[error("Sample/label count mismatch: {samples} samples, {labels} labels")]
    LabelMismatch { samples: usize, labels: usize },

    #[error("Plot rendering failed: {0}")]
    Render(String),
}

/// Project high-dimensional vectors to 2D with t-SNE.
///
/// Perplexity is clamped to `(n - 1) / 3` so the Barnes-Hut neighbor
/// requirement holds for small sample counts. That clamp needs at least
/// 4 samples to leave a usable perplexity, so smaller inputs are rejected
/// up front.
pub fn project_2d(vectors: &[Vec<f32>]) -> Result<Vec<(f32, f32)>, VizError> {
    let n = vectors.len();
    if n < 4 {
        return Err(VizError::TooFewSamples(n));
    }

    let max_perplexity = ((n - 1) as f32 / 3.0).floor();
    let perplexity = max_perplexity.min(30.0);

    let euclidean = |a: &Vec<f32>, b: &Vec<f32>| {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f32>()
            .sqrt()
    };

    let embedding = bhtsne::tSNE::new(vectors)
        .embedding_dim(2)
        .perplexity(perplexity)
        .epochs(1000)
        .barnes_hut(0.5, euclidean)
        .embedding();

    Ok(embedding
        .chunks_exact(2)
        .map(|point| (point[0], point[1]))
        .collect())
}

/// Render a 2D scatter plot to a PNG, one color per class with a legend
/// mapping color to the original label string.
pub fn render_scatter(
    path: &Path,
    points: &[(f32, f32)],
    labels: &[String],
) -> Result<(), VizError> {
    if points.len() != labels.len() {
        return Err(VizError::LabelMismatch {
            samples: points.len(),
            labels: labels.len(),
        });
    }

    // Group points by label, classes in sorted order for stable colors
    let mut by_label: BTreeMap<&str, Vec<(f32, f32)>> = BTreeMap::new();
    for (point, label) in points.iter().zip(labels.iter()) {
        by_label.entry(label.as_str()).or_default().push(*point);
    }

    let (x_min, x_max) = bounds(points.iter().map(|p| p.0));
    let (y_min, y_max) = bounds(points.iter().map(|p| p.1));

    let root = BitMapBackend::new(path, (900, 700)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| VizError::Render(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Hidden representation (t-SNE)", ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| VizError::Render(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_mesh()
        .draw()
        .map_err(|e| VizError::Render(e.to_string()))?;

    for (class_idx, (label, class_points)) in by_label.iter().enumerate() {
        let color = Palette99::pick(class_idx).mix(0.9);
        chart
            .draw_series(
                class_points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 4, color.filled())),
            )
            .map_err(|e| VizError::Render(e.to_string()))?
            .label(*label)
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| VizError::Render(e.to_string()))?;

    root.present().map_err(|e| VizError::Render(e.to_string()))?;

    info!(plot = %path.display(), classes = by_label.len(), "Scatter plot written");
    Ok(())
}

/// Project and render in one step
pub fn scatter_plot(
    path: &Path,
    vectors: &[Vec<f32>],
    labels: &[String],
) -> Result<(), VizError> {
    let points = project_2d(vectors)?;
    render_scatter(path, &points, labels)
}

fn bounds(values: impl Iterator<Item = f32>) -> (f32, f32) {
    let (mut min, mut max) = (f32::MAX, f32::MIN);
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    let pad = ((max - min) * 0.05).max(1e-3);
    (min - pad, max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(center: f32, count: usize) -> Vec<Vec<f32>> {
        (0..count)
            .map(|i| {
                let jitter = (i as f32) * 0.01;
                vec![center + jitter, center - jitter, center]
            })
            .collect()
    }

    #[test]
    fn test_project_2d_output_shape() {
        let mut vectors = cluster(0.0, 10);
        vectors.extend(cluster(5.0, 10));

        let points = project_2d(&vectors).unwrap();
        assert_eq!(points.len(), 20);
        assert!(points.iter().all(|(x, y)| x.is_finite() && y.is_finite()));
    }

    #[test]
    fn test_project_2d_too_few_samples() {
        // Fewer than 4 samples cannot satisfy the perplexity requirement;
        // they must fail with an error, not a library panic.
        for n in 1..4 {
            let vectors = cluster(0.0, n);
            let err = project_2d(&vectors);
            assert!(matches!(err, Err(VizError::TooFewSamples(m)) if m == n));
        }
    }

    #[test]
    fn test_project_2d_minimum_viable_input() {
        let points = project_2d(&cluster(0.0, 4)).unwrap();
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|(x, y)| x.is_finite() && y.is_finite()));
    }

    #[test]
    fn test_render_scatter_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scatter.png");

        let points = vec![(0.0, 0.0), (1.0, 1.0), (-1.0, 2.0)];
        let labels = vec![
            "male".to_string(),
            "female".to_string(),
            "male".to_string(),
        ];
        render_scatter(&path, &points, &labels).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_render_scatter_label_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scatter.png");

        let err = render_scatter(&path, &[(0.0, 0.0)], &[]);
        assert!(matches!(err, Err(VizError::LabelMismatch { .. })));
    }
}
