//! Cluster evaluation metrics.

use metaflux_core::{MetafluxError, Result};

use crate::distance::{compute_distance, DistanceMetric};

/// Compute the silhouette coefficient for each sample under `metric`.
///
/// Requires at least 2 samples and at least 2 distinct labels. The metric
/// must match the one used for fitting, or the score answers a different
/// question than the fit asked.
pub fn silhouette_samples(
    data: &[&[f64]],
    labels: &[usize],
    metric: DistanceMetric,
) -> Result<Vec<f64>> {
    let n = data.len();
    if n != labels.len() {
        return Err(MetafluxError::InvalidInput(
            "data and labels length mismatch".into(),
        ));
    }
    if n < 2 {
        return Err(MetafluxError::InvalidInput(
            "need at least 2 samples".into(),
        ));
    }

    let mut unique_labels: Vec<usize> = labels.to_vec();
    unique_labels.sort_unstable();
    unique_labels.dedup();

    if unique_labels.len() < 2 {
        return Err(MetafluxError::InvalidInput(
            "need at least 2 clusters".into(),
        ));
    }

    let score_one = |i: usize| -> Result<f64> {
        let mut same_sum = 0.0;
        let mut same_count = 0usize;
        for j in 0..n {
            if j != i && labels[j] == labels[i] {
                same_sum += compute_distance(data[i], data[j], metric)?;
                same_count += 1;
            }
        }
        let a = if same_count > 0 {
            same_sum / same_count as f64
        } else {
            0.0
        };

        let mut b = f64::INFINITY;
        for &label in &unique_labels {
            if label == labels[i] {
                continue;
            }
            let mut other_sum = 0.0;
            let mut other_count = 0usize;
            for j in 0..n {
                if labels[j] == label {
                    other_sum += compute_distance(data[i], data[j], metric)?;
                    other_count += 1;
                }
            }
            if other_count > 0 {
                let mean_dist = other_sum / other_count as f64;
                if mean_dist < b {
                    b = mean_dist;
                }
            }
        }

        let max_ab = a.max(b);
        Ok(if max_ab == 0.0 { 0.0 } else { (b - a) / max_ab })
    };

    #[cfg(feature = "parallel")]
    let scores = {
        use rayon::prelude::*;
        (0..n)
            .into_par_iter()
            .map(score_one)
            .collect::<Result<Vec<f64>>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let scores = (0..n).map(score_one).collect::<Result<Vec<f64>>>()?;

    Ok(scores)
}

/// Mean silhouette score across all samples.
///
/// See [`silhouette_samples`] for requirements.
pub fn silhouette_score(
    data: &[&[f64]],
    labels: &[usize],
    metric: DistanceMetric,
) -> Result<f64> {
    let samples = silhouette_samples(data, labels, metric)?;
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}
