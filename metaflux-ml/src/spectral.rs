//! Self-contained spectral clustering.
//!
//! Pipeline, in order: pairwise distances → heat-kernel affinity with a
//! percentile-derived bandwidth → symmetric-normalized Laplacian → low-order
//! eigenembedding → k-means partition. A companion [`harmonize`] routine
//! relabels a predicted clustering against a reference labeling via optimal
//! assignment so the two become comparable.

use metaflux_core::{MetafluxError, Result};

use crate::cluster::{kmeans, KMeansConfig};
use crate::distance::{DistanceMatrix, DistanceMetric};

/// Percentile of the pairwise-distance pool used as the kernel bandwidth.
const BANDWIDTH_PERCENTILE: f64 = 5.0;

/// Embed the samples spectrally and partition the embedding into `k` groups.
///
/// The kernel bandwidth is the 5th percentile of all pairwise distances;
/// when dense ties at zero drive that percentile to exactly 0, the smallest
/// strictly-positive distance is used instead. If no strictly-positive
/// distance exists anywhere the input is degenerate and an error is returned
/// rather than dividing by zero.
pub fn embed_and_partition(
    data: &[&[f64]],
    k: usize,
    metric: DistanceMetric,
) -> Result<Vec<usize>> {
    let n = data.len();
    if k == 0 || k > n {
        return Err(MetafluxError::InvalidInput(format!(
            "k ({}) must be in [1, n_samples ({})]",
            k, n
        )));
    }

    let dm = DistanceMatrix::from_points(data, metric)?;
    let sigma = bandwidth(&dm)?;

    // Affinity: A = exp(-S^2 / (2 sigma^2)), no self-affinity.
    let mut affinity = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                let s = dm.get(i, j);
                affinity[i * n + j] = (-(s * s) / (2.0 * sigma * sigma)).exp();
            }
        }
    }

    // Symmetric-normalized Laplacian: L = I - D^{-1/2} A D^{-1/2}.
    // Off-diagonal affinities are strictly positive, so row sums are too.
    let mut inv_sqrt_deg = vec![0.0; n];
    for i in 0..n {
        let row_sum: f64 = affinity[i * n..(i + 1) * n].iter().sum();
        inv_sqrt_deg[i] = 1.0 / row_sum.sqrt();
    }
    let mut laplacian = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let norm = affinity[i * n + j] * inv_sqrt_deg[i] * inv_sqrt_deg[j];
            laplacian[i * n + j] = if i == j { 1.0 - norm } else { -norm };
        }
    }

    // Eigenvectors of the k smallest eigenvalues form the embedding rows.
    let (eigenvalues, eigenvectors) = jacobi_eigen(&laplacian, n);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigenvalues[a].total_cmp(&eigenvalues[b]));

    let mut embedding = vec![vec![0.0; k]; n];
    for (col, &eig_idx) in order.iter().take(k).enumerate() {
        for i in 0..n {
            embedding[i][col] = eigenvectors[i * n + eig_idx];
        }
    }

    let embed_refs: Vec<&[f64]> = embedding.iter().map(|r| r.as_slice()).collect();
    let config = KMeansConfig {
        n_clusters: k,
        n_init: 100,
        max_iter: 1000,
        tolerance: 1e-6,
        seed: 10,
    };
    let fit = kmeans(&embed_refs, &config)?;
    Ok(fit.labels)
}

/// Kernel bandwidth: percentile of the pairwise pool with zero-tie fallback.
fn bandwidth(dm: &DistanceMatrix) -> Result<f64> {
    let sigma = percentile(dm.condensed(), BANDWIDTH_PERCENTILE);
    if sigma > 0.0 {
        return Ok(sigma);
    }
    // Dense ties at zero distance: fall back to the smallest strictly
    // positive distance.
    dm.condensed()
        .iter()
        .copied()
        .filter(|&d| d > 0.0)
        .fold(None, |acc: Option<f64>, d| match acc {
            Some(m) if m <= d => Some(m),
            _ => Some(d),
        })
        .ok_or_else(|| {
            MetafluxError::DegenerateInput(
                "all pairwise distances are zero; samples are indistinguishable".into(),
            )
        })
}

/// Linear-interpolation percentile over an unsorted slice, `q` in [0, 100].
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

// ---------------------------------------------------------------------------
// Symmetric eigendecomposition
// ---------------------------------------------------------------------------

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOL: f64 = 1e-12;

/// Full eigendecomposition of a symmetric matrix via cyclic Jacobi rotations.
///
/// Returns `(eigenvalues, eigenvectors)` where `eigenvectors[i * n + j]` is
/// component `i` of the eigenvector for `eigenvalues[j]`. Eigenvalues are
/// unsorted.
fn jacobi_eigen(matrix: &[f64], n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut a = matrix.to_vec();
    let mut v = vec![0.0; n * n];
    for i in 0..n {
        v[i * n + i] = 1.0;
    }

    for _sweep in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[p * n + q] * a[p * n + q];
            }
        }
        if off < JACOBI_TOL {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq.abs() < 1e-30 {
                    continue;
                }
                let app = a[p * n + p];
                let aqq = a[q * n + q];
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                // Two-sided rotation on rows/columns p and q.
                for i in 0..n {
                    let aip = a[i * n + p];
                    let aiq = a[i * n + q];
                    a[i * n + p] = c * aip - s * aiq;
                    a[i * n + q] = s * aip + c * aiq;
                }
                for j in 0..n {
                    let apj = a[p * n + j];
                    let aqj = a[q * n + j];
                    a[p * n + j] = c * apj - s * aqj;
                    a[q * n + j] = s * apj + c * aqj;
                }
                for i in 0..n {
                    let vip = v[i * n + p];
                    let viq = v[i * n + q];
                    v[i * n + p] = c * vip - s * viq;
                    v[i * n + q] = s * vip + c * viq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i * n + i]).collect();
    (eigenvalues, v)
}

// ---------------------------------------------------------------------------
// Label harmonization
// ---------------------------------------------------------------------------

/// Remap `predicted` labels so they line up with `reference` labels.
///
/// Builds the overlap-count matrix over the union label set and solves the
/// assignment maximizing total overlap with the Hungarian algorithm, then
/// renames each predicted label through the resulting bijection. Cluster
/// membership is untouched; only label identity changes.
pub fn harmonize(reference: &[usize], predicted: &[usize]) -> Result<Vec<usize>> {
    if reference.len() != predicted.len() {
        return Err(MetafluxError::InvalidInput(format!(
            "label length mismatch: {} vs {}",
            reference.len(),
            predicted.len()
        )));
    }
    if reference.is_empty() {
        return Ok(Vec::new());
    }

    let mut labels: Vec<usize> = reference.iter().chain(predicted).copied().collect();
    labels.sort_unstable();
    labels.dedup();
    let m = labels.len();
    let pos = |l: usize| labels.iter().position(|&x| x == l).unwrap();

    // Overlap counts: rows are reference labels, columns predicted.
    let mut overlap = vec![vec![0.0; m]; m];
    for (&r, &p) in reference.iter().zip(predicted) {
        overlap[pos(r)][pos(p)] += 1.0;
    }

    // Maximize overlap = minimize negated overlap.
    let cost: Vec<Vec<f64>> = overlap
        .iter()
        .map(|row| row.iter().map(|&c| -c).collect())
        .collect();
    let assignment = hungarian(&cost);

    // Predicted label at column j renames to the reference label of its
    // matched row.
    let mut remap = vec![0usize; m];
    for (row, &col) in assignment.iter().enumerate() {
        remap[col] = labels[row];
    }

    Ok(predicted.iter().map(|&p| remap[pos(p)]).collect())
}

/// Exact minimum-cost assignment on a square cost matrix (Hungarian
/// algorithm with potentials, O(n^3)). Returns the column assigned to each
/// row.
fn hungarian(cost: &[Vec<f64>]) -> Vec<usize> {
    let n = cost.len();
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut matched = vec![0usize; n + 1]; // matched[j] = row occupying column j
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        matched[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[j0] = true;
            let i0 = matched[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[matched[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if matched[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            matched[j0] = matched[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for j in 1..=n {
        if matched[j] > 0 {
            assignment[matched[j] - 1] = j - 1;
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_refs(data: &[Vec<f64>]) -> Vec<&[f64]> {
        data.iter().map(|v| v.as_slice()).collect()
    }

    #[test]
    fn two_blobs_split() {
        let data = vec![
            vec![0.0, 0.0],
            vec![0.2, 0.1],
            vec![0.1, 0.2],
            vec![8.0, 8.0],
            vec![8.2, 8.1],
            vec![8.1, 8.2],
        ];
        let refs = make_refs(&data);
        let labels = embed_and_partition(&refs, 2, DistanceMetric::Euclidean).unwrap();
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[3], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn bandwidth_fallback_engages() {
        // 6 coincident points and 4 spread out: 15 of 45 pairwise distances
        // are zero, so the 5th percentile is exactly 0 and the engine must
        // fall back to the smallest positive distance.
        let mut data = vec![vec![0.0]; 6];
        data.extend(vec![vec![5.0], vec![6.0], vec![7.0], vec![8.0]]);
        let refs = make_refs(&data);
        let labels = embed_and_partition(&refs, 2, DistanceMetric::Euclidean).unwrap();
        assert_eq!(labels.len(), 10);
        // The six coincident samples are indistinguishable and must share a
        // label.
        assert!(labels[..6].iter().all(|&l| l == labels[0]));
    }

    #[test]
    fn all_identical_is_degenerate() {
        let data = vec![vec![1.0, 2.0]; 5];
        let refs = make_refs(&data);
        let err = embed_and_partition(&refs, 2, DistanceMetric::Euclidean).unwrap_err();
        assert!(matches!(err, MetafluxError::DegenerateInput(_)));
    }

    #[test]
    fn k_out_of_range() {
        let data = vec![vec![0.0], vec![1.0]];
        let refs = make_refs(&data);
        assert!(embed_and_partition(&refs, 0, DistanceMetric::Euclidean).is_err());
        assert!(embed_and_partition(&refs, 3, DistanceMetric::Euclidean).is_err());
    }

    #[test]
    fn percentile_interpolates() {
        let vals = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&vals, 0.0) - 0.0).abs() < 1e-12);
        assert!((percentile(&vals, 50.0) - 2.0).abs() < 1e-12);
        assert!((percentile(&vals, 100.0) - 4.0).abs() < 1e-12);
        assert!((percentile(&vals, 25.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn jacobi_recovers_diagonal() {
        // Diagonal matrix: eigenvalues are the diagonal entries.
        let m = vec![3.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0];
        let (mut vals, _) = jacobi_eigen(&m, 3);
        vals.sort_by(|a, b| a.total_cmp(b));
        assert!((vals[0] - 1.0).abs() < 1e-9);
        assert!((vals[1] - 2.0).abs() < 1e-9);
        assert!((vals[2] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn jacobi_known_2x2() {
        // [[2, 1], [1, 2]] has eigenvalues 1 and 3.
        let m = vec![2.0, 1.0, 1.0, 2.0];
        let (mut vals, _) = jacobi_eigen(&m, 2);
        vals.sort_by(|a, b| a.total_cmp(b));
        assert!((vals[0] - 1.0).abs() < 1e-9);
        assert!((vals[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn harmonize_swapped_labels() {
        let reference = vec![0, 0, 0, 1, 1, 1];
        let predicted = vec![1, 1, 1, 0, 0, 0];
        let fit = harmonize(&reference, &predicted).unwrap();
        assert_eq!(fit, reference);
    }

    #[test]
    fn harmonize_disjoint_label_values() {
        let reference = vec![0, 0, 0, 1, 1, 1];
        let predicted = vec![2, 2, 2, 0, 0, 0];
        let fit = harmonize(&reference, &predicted).unwrap();
        assert_eq!(fit, reference);
    }

    #[test]
    fn harmonize_preserves_membership() {
        let reference = vec![0, 0, 1, 1, 2, 2];
        let predicted = vec![2, 2, 0, 0, 1, 1];
        let fit = harmonize(&reference, &predicted).unwrap();
        // Samples that shared a predicted label still share one.
        for i in 0..predicted.len() {
            for j in 0..predicted.len() {
                assert_eq!(predicted[i] == predicted[j], fit[i] == fit[j]);
            }
        }
    }

    #[test]
    fn harmonize_length_mismatch() {
        assert!(harmonize(&[0, 1], &[0]).is_err());
    }

    #[test]
    fn harmonize_imperfect_prediction() {
        // One sample misplaced; the bulk mapping should still win.
        let reference = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let predicted = vec![1, 1, 1, 0, 0, 0, 0, 0];
        let fit = harmonize(&reference, &predicted).unwrap();
        assert_eq!(fit, vec![0, 0, 0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn hungarian_simple() {
        // Optimal assignment is (0->1, 1->0, 2->2) with total cost 5.
        let cost = vec![
            vec![4.0, 1.0, 3.0],
            vec![2.0, 0.0, 5.0],
            vec![3.0, 2.0, 2.0],
        ];
        let assign = hungarian(&cost);
        let total: f64 = assign.iter().enumerate().map(|(i, &j)| cost[i][j]).sum();
        assert!((total - 5.0).abs() < 1e-12);
    }
}
