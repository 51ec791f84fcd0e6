//! Distance metrics and pairwise distance matrices.

use metaflux_core::{MetafluxError, Result, Summarizable};

/// Supported distance metrics for clustering and evaluation.
///
/// Numeric impact vectors are compared under [`DistanceMetric::Euclidean`];
/// binary presence vectors under [`DistanceMetric::Jaccard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceMetric {
    Euclidean,
    Jaccard,
}

/// Euclidean (L2) distance between two vectors.
pub fn euclidean(a: &[f64], b: &[f64]) -> Result<f64> {
    validate_pair(a, b)?;
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    Ok(sum.sqrt())
}

/// Jaccard distance between two vectors interpreted as presence profiles.
///
/// A position is "present" when its value is non-zero. The distance is the
/// number of positions where presence disagrees, divided by the number of
/// positions where at least one vector is present. Two all-zero vectors have
/// distance 0.0.
pub fn jaccard(a: &[f64], b: &[f64]) -> Result<f64> {
    validate_pair(a, b)?;
    let mut mismatch = 0usize;
    let mut union = 0usize;
    for (x, y) in a.iter().zip(b) {
        let px = *x != 0.0;
        let py = *y != 0.0;
        if px || py {
            union += 1;
            if px != py {
                mismatch += 1;
            }
        }
    }
    if union == 0 {
        return Ok(0.0);
    }
    Ok(mismatch as f64 / union as f64)
}

/// Compute distance between two vectors using the given metric.
pub fn compute_distance(a: &[f64], b: &[f64], metric: DistanceMetric) -> Result<f64> {
    match metric {
        DistanceMetric::Euclidean => euclidean(a, b),
        DistanceMetric::Jaccard => jaccard(a, b),
    }
}

/// Symmetric distance matrix stored in condensed upper-triangle form.
///
/// For `n` points the condensed vector has `n*(n-1)/2` elements.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistanceMatrix {
    condensed: Vec<f64>,
    n: usize,
}

impl DistanceMatrix {
    /// Build a distance matrix from row-vectors of points.
    pub fn from_points(data: &[&[f64]], metric: DistanceMetric) -> Result<Self> {
        let n = data.len();
        if n < 2 {
            return Err(MetafluxError::InvalidInput(
                "need at least 2 points".into(),
            ));
        }
        let dim = data[0].len();
        if dim == 0 {
            return Err(MetafluxError::InvalidInput("empty vectors".into()));
        }
        for (i, row) in data.iter().enumerate() {
            if row.len() != dim {
                return Err(MetafluxError::InvalidInput(format!(
                    "point {} has length {}, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
        }
        #[cfg(feature = "parallel")]
        let condensed = {
            use rayon::prelude::*;
            (0..n)
                .into_par_iter()
                .map(|i| {
                    ((i + 1)..n)
                        .map(|j| compute_distance(data[i], data[j], metric))
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect::<Vec<f64>>()
        };
        #[cfg(not(feature = "parallel"))]
        let condensed = {
            let size = n * (n - 1) / 2;
            let mut condensed = Vec::with_capacity(size);
            for i in 0..n {
                for j in (i + 1)..n {
                    condensed.push(compute_distance(data[i], data[j], metric)?);
                }
            }
            condensed
        };
        Ok(Self { condensed, n })
    }

    /// Get the distance between points `i` and `j`.
    ///
    /// Returns 0.0 when `i == j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        self.condensed[self.index(a, b)]
    }

    /// Number of points.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Access the raw condensed storage (each unordered pair once).
    pub fn condensed(&self) -> &[f64] {
        &self.condensed
    }

    /// Map (i, j) where i < j to condensed index.
    fn index(&self, i: usize, j: usize) -> usize {
        // row i starts at position: i*n - i*(i+1)/2
        i * self.n - i * (i + 1) / 2 + (j - i - 1)
    }
}

impl Summarizable for DistanceMatrix {
    fn summary(&self) -> String {
        format!("DistanceMatrix: {}x{}", self.n, self.n)
    }
}

fn validate_pair(a: &[f64], b: &[f64]) -> Result<()> {
    if a.is_empty() {
        return Err(MetafluxError::InvalidInput("empty vectors".into()));
    }
    if a.len() != b.len() {
        return Err(MetafluxError::InvalidInput(format!(
            "length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_known() {
        let d = euclidean(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn euclidean_identical() {
        let d = euclidean(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((d - 0.0).abs() < 1e-12);
    }

    #[test]
    fn euclidean_empty_error() {
        assert!(euclidean(&[], &[]).is_err());
    }

    #[test]
    fn euclidean_length_mismatch() {
        assert!(euclidean(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn jaccard_disjoint() {
        let d = jaccard(&[1.0, 1.0, 0.0, 0.0], &[0.0, 0.0, 1.0, 1.0]).unwrap();
        assert!((d - 1.0).abs() < 1e-12);
    }

    #[test]
    fn jaccard_identical_presence() {
        // Magnitudes differ but presence agrees everywhere.
        let d = jaccard(&[0.5, 0.0, 2.0], &[1.5, 0.0, 0.1]).unwrap();
        assert!((d - 0.0).abs() < 1e-12);
    }

    #[test]
    fn jaccard_partial_overlap() {
        // union = 3 positions, mismatch = 2
        let d = jaccard(&[1.0, 1.0, 0.0], &[1.0, 0.0, 1.0]).unwrap();
        assert!((d - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn jaccard_both_empty_sets() {
        let d = jaccard(&[0.0, 0.0], &[0.0, 0.0]).unwrap();
        assert!((d - 0.0).abs() < 1e-12);
    }

    #[test]
    fn distance_matrix_from_points() {
        let pts: Vec<Vec<f64>> = vec![vec![0.0, 0.0], vec![3.0, 0.0], vec![0.0, 4.0]];
        let refs: Vec<&[f64]> = pts.iter().map(|v| v.as_slice()).collect();
        let dm = DistanceMatrix::from_points(&refs, DistanceMetric::Euclidean).unwrap();
        assert_eq!(dm.n(), 3);
        assert!((dm.get(0, 0) - 0.0).abs() < 1e-12);
        assert!((dm.get(0, 1) - 3.0).abs() < 1e-12);
        assert!((dm.get(0, 2) - 4.0).abs() < 1e-12);
        assert!((dm.get(1, 0) - 3.0).abs() < 1e-12); // symmetric
        assert!((dm.get(2, 0) - 4.0).abs() < 1e-12); // symmetric
    }

    #[test]
    fn distance_matrix_jaccard() {
        let pts: Vec<Vec<f64>> = vec![vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 1.0]];
        let refs: Vec<&[f64]> = pts.iter().map(|v| v.as_slice()).collect();
        let dm = DistanceMatrix::from_points(&refs, DistanceMetric::Jaccard).unwrap();
        assert!((dm.get(0, 1) - 0.5).abs() < 1e-12);
        assert!((dm.get(0, 2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn distance_matrix_too_few_points() {
        let pts: Vec<Vec<f64>> = vec![vec![1.0]];
        let refs: Vec<&[f64]> = pts.iter().map(|v| v.as_slice()).collect();
        assert!(DistanceMatrix::from_points(&refs, DistanceMetric::Euclidean).is_err());
    }

    #[test]
    fn distance_matrix_summary() {
        let pts: Vec<Vec<f64>> = vec![vec![0.0], vec![1.0], vec![2.0]];
        let refs: Vec<&[f64]> = pts.iter().map(|v| v.as_slice()).collect();
        let dm = DistanceMatrix::from_points(&refs, DistanceMetric::Euclidean).unwrap();
        assert_eq!(dm.summary(), "DistanceMatrix: 3x3");
    }
}
