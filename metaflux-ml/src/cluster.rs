//! Clustering algorithms: k-means and Gaussian mixtures.
//!
//! Both fitters take explicit seeds; restarts derive an independent seed per
//! attempt so parallel execution stays reproducible.

use metaflux_core::{MetafluxError, Result, Summarizable};

// ---------------------------------------------------------------------------
// PRNG
// ---------------------------------------------------------------------------

/// Minimal xorshift64 PRNG — no external dependency needed.
pub(crate) struct Xorshift64(u64);

impl Xorshift64 {
    pub(crate) fn new(seed: u64) -> Self {
        Self(if seed == 0 { 1 } else { seed })
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub(crate) fn next_bounded(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }

    pub(crate) fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }
}

/// Derive an independent stream seed from a base seed and a unit index
/// (splitmix64 finalizer).
pub(crate) fn derive_seed(base: u64, unit: u64) -> u64 {
    let mut z = base
        .wrapping_add(0x9e3779b97f4a7c15)
        .wrapping_add(unit.wrapping_mul(0xbf58476d1ce4e5b9));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

// ---------------------------------------------------------------------------
// K-Means
// ---------------------------------------------------------------------------

/// Configuration for k-means clustering.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KMeansConfig {
    pub n_clusters: usize,
    /// Independent restarts; the fit with the lowest inertia wins.
    pub n_init: usize,
    pub max_iter: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
            seed: 10,
        }
    }
}

/// Result of k-means clustering.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KMeansResult {
    /// Flat centroid data: `n_clusters * n_features` values.
    pub centroids: Vec<f64>,
    /// Cluster label for each data point.
    pub labels: Vec<usize>,
    /// Sum of squared distances to nearest centroid.
    pub inertia: f64,
    /// Dimensionality of the data.
    pub n_features: usize,
}

impl Summarizable for KMeansResult {
    fn summary(&self) -> String {
        let k = if self.n_features > 0 {
            self.centroids.len() / self.n_features
        } else {
            0
        };
        format!("KMeans: k={}, inertia={:.4}", k, self.inertia)
    }
}

/// Run k-means clustering on the given data points.
///
/// Uses k-means++ initialization and Lloyd's algorithm, repeated over
/// `n_init` independently seeded restarts; the lowest-inertia fit is kept.
pub fn kmeans(data: &[&[f64]], config: &KMeansConfig) -> Result<KMeansResult> {
    validate_points(data)?;
    let n = data.len();
    let k = config.n_clusters;
    if k == 0 {
        return Err(MetafluxError::InvalidInput("n_clusters must be > 0".into()));
    }
    if k > n {
        return Err(MetafluxError::InvalidInput(format!(
            "n_clusters ({}) > n_samples ({})",
            k, n
        )));
    }
    if config.n_init == 0 {
        return Err(MetafluxError::InvalidInput("n_init must be > 0".into()));
    }

    let mut best: Option<KMeansResult> = None;
    for restart in 0..config.n_init {
        let seed = derive_seed(config.seed, restart as u64);
        let fit = kmeans_single(data, k, config.max_iter, config.tolerance, seed);
        let better = match &best {
            Some(b) => fit.inertia < b.inertia,
            None => true,
        };
        if better {
            best = Some(fit);
        }
    }
    // n_init >= 1, so best is always populated here.
    best.ok_or_else(|| MetafluxError::InvalidInput("no k-means fit produced".into()))
}

/// One seeded k-means++ / Lloyd fit.
fn kmeans_single(data: &[&[f64]], k: usize, max_iter: usize, tolerance: f64, seed: u64) -> KMeansResult {
    let n = data.len();
    let dim = data[0].len();

    // k-means++ init
    let mut rng = Xorshift64::new(seed);
    let mut centroids = vec![0.0; k * dim];
    let first = rng.next_bounded(n as u64) as usize;
    centroids[..dim].copy_from_slice(data[first]);

    for c in 1..k {
        // Min squared distance from each point to existing centroids
        let mut dists = vec![f64::INFINITY; n];
        for i in 0..n {
            for prev in 0..c {
                let cent = &centroids[prev * dim..(prev + 1) * dim];
                let d = sq_euclidean(data[i], cent);
                if d < dists[i] {
                    dists[i] = d;
                }
            }
        }
        // Weighted random selection proportional to dist^2
        let total: f64 = dists.iter().sum();
        if total == 0.0 {
            // All points identical; just pick next point
            centroids[c * dim..(c + 1) * dim].copy_from_slice(data[c % n]);
        } else {
            let threshold = rng.next_f64() * total;
            let mut cumulative = 0.0;
            let mut chosen = n - 1;
            for (i, &d) in dists.iter().enumerate() {
                cumulative += d;
                if cumulative >= threshold {
                    chosen = i;
                    break;
                }
            }
            centroids[c * dim..(c + 1) * dim].copy_from_slice(data[chosen]);
        }
    }

    // Lloyd's iterations
    let mut labels = vec![0usize; n];

    for _iter in 0..max_iter {
        // Assign each point to nearest centroid
        for i in 0..n {
            let mut best_dist = f64::INFINITY;
            let mut best_c = 0;
            for c in 0..k {
                let cent = &centroids[c * dim..(c + 1) * dim];
                let d = sq_euclidean(data[i], cent);
                if d < best_dist {
                    best_dist = d;
                    best_c = c;
                }
            }
            labels[i] = best_c;
        }

        // Update centroids
        let mut new_centroids = vec![0.0; k * dim];
        let mut counts = vec![0usize; k];
        for i in 0..n {
            let c = labels[i];
            counts[c] += 1;
            for d in 0..dim {
                new_centroids[c * dim + d] += data[i][d];
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                let cnt = counts[c] as f64;
                for d in 0..dim {
                    new_centroids[c * dim + d] /= cnt;
                }
            } else {
                // Empty cluster: keep old centroid
                new_centroids[c * dim..(c + 1) * dim]
                    .copy_from_slice(&centroids[c * dim..(c + 1) * dim]);
            }
        }

        // Check convergence
        let mut max_shift = 0.0_f64;
        for c in 0..k {
            let shift = sq_euclidean(
                &centroids[c * dim..(c + 1) * dim],
                &new_centroids[c * dim..(c + 1) * dim],
            )
            .sqrt();
            if shift > max_shift {
                max_shift = shift;
            }
        }

        centroids = new_centroids;

        if max_shift < tolerance {
            break;
        }
    }

    // Compute inertia
    let mut inertia = 0.0;
    for i in 0..n {
        let c = labels[i];
        inertia += sq_euclidean(data[i], &centroids[c * dim..(c + 1) * dim]);
    }

    KMeansResult {
        centroids,
        labels,
        inertia,
        n_features: dim,
    }
}

// ---------------------------------------------------------------------------
// Gaussian mixture
// ---------------------------------------------------------------------------

/// Configuration for Gaussian-mixture EM with diagonal covariances.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MixtureConfig {
    pub n_components: usize,
    /// Independent restarts; the fit with the highest log-likelihood wins.
    pub n_init: usize,
    pub max_iter: usize,
    /// Convergence tolerance on the per-sample log-likelihood change.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            n_init: 42,
            max_iter: 1000,
            tolerance: 1e-6,
            seed: 10,
        }
    }
}

/// Result of Gaussian-mixture fitting.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MixtureResult {
    /// Hard label per sample (argmax responsibility).
    pub labels: Vec<usize>,
    /// Per-sample probability over components; each row sums to 1.
    pub responsibilities: Vec<Vec<f64>>,
    /// Final log-likelihood of the winning restart.
    pub log_likelihood: f64,
}

impl Summarizable for MixtureResult {
    fn summary(&self) -> String {
        let k = self.responsibilities.first().map_or(0, |r| r.len());
        format!(
            "GaussianMixture: k={}, log-likelihood={:.4}",
            k, self.log_likelihood,
        )
    }
}

/// Variance floor keeping component covariances invertible.
const VAR_FLOOR: f64 = 1e-6;

/// Fit a diagonal-covariance Gaussian mixture by expectation-maximization.
///
/// Runs `n_init` independently seeded restarts and keeps the fit with the
/// highest log-likelihood. Responsibilities are computed with log-sum-exp
/// normalization so widely separated components stay numerically stable.
pub fn gaussian_mixture(data: &[&[f64]], config: &MixtureConfig) -> Result<MixtureResult> {
    validate_points(data)?;
    let n = data.len();
    let k = config.n_components;
    if k == 0 {
        return Err(MetafluxError::InvalidInput(
            "n_components must be > 0".into(),
        ));
    }
    if k > n {
        return Err(MetafluxError::InvalidInput(format!(
            "n_components ({}) > n_samples ({})",
            k, n
        )));
    }
    if config.n_init == 0 {
        return Err(MetafluxError::InvalidInput("n_init must be > 0".into()));
    }

    let mut best: Option<MixtureResult> = None;
    for restart in 0..config.n_init {
        let seed = derive_seed(config.seed, restart as u64);
        let fit = em_single(data, k, config.max_iter, config.tolerance, seed);
        let better = match &best {
            Some(b) => fit.log_likelihood > b.log_likelihood,
            None => true,
        };
        if better {
            best = Some(fit);
        }
    }
    best.ok_or_else(|| MetafluxError::InvalidInput("no mixture fit produced".into()))
}

/// One seeded EM run.
fn em_single(data: &[&[f64]], k: usize, max_iter: usize, tolerance: f64, seed: u64) -> MixtureResult {
    let n = data.len();
    let dim = data[0].len();
    let mut rng = Xorshift64::new(seed);

    // Init: random distinct-ish points as means, global per-dim variance,
    // uniform weights.
    let mut means = vec![0.0; k * dim];
    for c in 0..k {
        let pick = rng.next_bounded(n as u64) as usize;
        means[c * dim..(c + 1) * dim].copy_from_slice(data[pick]);
    }
    let mut global_var = vec![0.0; dim];
    let mut global_mean = vec![0.0; dim];
    for row in data {
        for d in 0..dim {
            global_mean[d] += row[d];
        }
    }
    for d in 0..dim {
        global_mean[d] /= n as f64;
    }
    for row in data {
        for d in 0..dim {
            let diff = row[d] - global_mean[d];
            global_var[d] += diff * diff;
        }
    }
    for d in 0..dim {
        global_var[d] = (global_var[d] / n as f64).max(VAR_FLOOR);
    }
    let mut vars = vec![0.0; k * dim];
    for c in 0..k {
        vars[c * dim..(c + 1) * dim].copy_from_slice(&global_var);
    }
    let mut weights = vec![1.0 / k as f64; k];

    let mut resp = vec![vec![0.0; k]; n];
    let mut prev_ll = f64::NEG_INFINITY;
    let mut log_likelihood = f64::NEG_INFINITY;

    for _iter in 0..max_iter {
        // E-step: log responsibilities with log-sum-exp normalization.
        let mut ll = 0.0;
        for i in 0..n {
            let mut log_p = vec![0.0; k];
            for c in 0..k {
                log_p[c] = weights[c].ln()
                    + log_diag_normal(
                        data[i],
                        &means[c * dim..(c + 1) * dim],
                        &vars[c * dim..(c + 1) * dim],
                    );
            }
            let max_lp = log_p.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let log_norm = max_lp
                + log_p
                    .iter()
                    .map(|&lp| (lp - max_lp).exp())
                    .sum::<f64>()
                    .ln();
            for c in 0..k {
                resp[i][c] = (log_p[c] - log_norm).exp();
            }
            ll += log_norm;
        }
        log_likelihood = ll;

        // M-step
        for c in 0..k {
            let nk: f64 = resp.iter().map(|r| r[c]).sum();
            if nk <= 0.0 {
                continue; // dead component keeps its parameters
            }
            weights[c] = nk / n as f64;
            for d in 0..dim {
                let mut m = 0.0;
                for i in 0..n {
                    m += resp[i][c] * data[i][d];
                }
                means[c * dim + d] = m / nk;
            }
            for d in 0..dim {
                let mu = means[c * dim + d];
                let mut v = 0.0;
                for i in 0..n {
                    let diff = data[i][d] - mu;
                    v += resp[i][c] * diff * diff;
                }
                vars[c * dim + d] = (v / nk).max(VAR_FLOOR);
            }
        }

        if (log_likelihood - prev_ll).abs() < tolerance * n as f64 {
            break;
        }
        prev_ll = log_likelihood;
    }

    let labels = resp
        .iter()
        .map(|r| {
            let mut best_c = 0;
            for c in 1..k {
                if r[c] > r[best_c] {
                    best_c = c;
                }
            }
            best_c
        })
        .collect();

    MixtureResult {
        labels,
        responsibilities: resp,
        log_likelihood,
    }
}

/// Log-density of a diagonal-covariance Gaussian at `x`.
fn log_diag_normal(x: &[f64], mean: &[f64], var: &[f64]) -> f64 {
    let mut lp = 0.0;
    for d in 0..x.len() {
        let diff = x[d] - mean[d];
        lp += -0.5 * ((2.0 * std::f64::consts::PI * var[d]).ln() + diff * diff / var[d]);
    }
    lp
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Squared Euclidean distance (no sqrt for speed).
fn sq_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn validate_points(data: &[&[f64]]) -> Result<()> {
    if data.is_empty() {
        return Err(MetafluxError::InvalidInput("empty data".into()));
    }
    let dim = data[0].len();
    if dim == 0 {
        return Err(MetafluxError::InvalidInput("zero-dimensional data".into()));
    }
    for (i, row) in data.iter().enumerate() {
        if row.len() != dim {
            return Err(MetafluxError::InvalidInput(format!(
                "point {} has dimension {}, expected {}",
                i,
                row.len(),
                dim
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_refs(data: &[Vec<f64>]) -> Vec<&[f64]> {
        data.iter().map(|v| v.as_slice()).collect()
    }

    fn two_blob_data() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.1],
            vec![0.2, 0.0],
            vec![10.0, 10.0],
            vec![10.1, 10.1],
            vec![10.2, 10.0],
        ]
    }

    // --- K-Means ---

    #[test]
    fn kmeans_two_clusters() {
        let data = two_blob_data();
        let refs = make_refs(&data);
        let config = KMeansConfig {
            n_clusters: 2,
            ..Default::default()
        };
        let result = kmeans(&refs, &config).unwrap();
        assert_eq!(result.labels.len(), 6);
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[0], result.labels[2]);
        assert_eq!(result.labels[3], result.labels[4]);
        assert_eq!(result.labels[3], result.labels[5]);
        assert_ne!(result.labels[0], result.labels[3]);
    }

    #[test]
    fn kmeans_reproducible() {
        let data = two_blob_data();
        let refs = make_refs(&data);
        let config = KMeansConfig {
            n_clusters: 2,
            ..Default::default()
        };
        let a = kmeans(&refs, &config).unwrap();
        let b = kmeans(&refs, &config).unwrap();
        assert_eq!(a.labels, b.labels);
        assert!((a.inertia - b.inertia).abs() < 1e-12);
    }

    #[test]
    fn kmeans_restarts_do_not_hurt() {
        let data = two_blob_data();
        let refs = make_refs(&data);
        let one = kmeans(
            &refs,
            &KMeansConfig {
                n_clusters: 2,
                n_init: 1,
                ..Default::default()
            },
        )
        .unwrap();
        let many = kmeans(
            &refs,
            &KMeansConfig {
                n_clusters: 2,
                n_init: 20,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(many.inertia <= one.inertia + 1e-12);
    }

    #[test]
    fn kmeans_too_many_clusters() {
        let data = vec![vec![1.0], vec![2.0]];
        let refs = make_refs(&data);
        let config = KMeansConfig {
            n_clusters: 3,
            ..Default::default()
        };
        assert!(kmeans(&refs, &config).is_err());
    }

    #[test]
    fn kmeans_empty_data() {
        let refs: Vec<&[f64]> = vec![];
        let config = KMeansConfig::default();
        assert!(kmeans(&refs, &config).is_err());
    }

    #[test]
    fn kmeans_summary() {
        let data = vec![vec![0.0], vec![1.0], vec![10.0], vec![11.0]];
        let refs = make_refs(&data);
        let config = KMeansConfig {
            n_clusters: 2,
            ..Default::default()
        };
        let result = kmeans(&refs, &config).unwrap();
        assert!(result.summary().contains("k=2"));
    }

    // --- Gaussian mixture ---

    #[test]
    fn mixture_two_components() {
        let data = two_blob_data();
        let refs = make_refs(&data);
        let config = MixtureConfig {
            n_components: 2,
            n_init: 8,
            ..Default::default()
        };
        let result = gaussian_mixture(&refs, &config).unwrap();
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[3], result.labels[4]);
        assert_ne!(result.labels[0], result.labels[3]);
    }

    #[test]
    fn mixture_responsibilities_sum_to_one() {
        let data = two_blob_data();
        let refs = make_refs(&data);
        let config = MixtureConfig {
            n_components: 2,
            n_init: 4,
            ..Default::default()
        };
        let result = gaussian_mixture(&refs, &config).unwrap();
        assert_eq!(result.responsibilities.len(), 6);
        for row in &result.responsibilities {
            assert_eq!(row.len(), 2);
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "row sums to {}", sum);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn mixture_confident_on_separated_blobs() {
        let data = two_blob_data();
        let refs = make_refs(&data);
        let config = MixtureConfig {
            n_components: 2,
            n_init: 8,
            ..Default::default()
        };
        let result = gaussian_mixture(&refs, &config).unwrap();
        for (row, &label) in result.responsibilities.iter().zip(&result.labels) {
            assert!(row[label] > 0.99, "weak responsibility {:?}", row);
        }
    }

    #[test]
    fn mixture_too_many_components() {
        let data = vec![vec![0.0], vec![1.0]];
        let refs = make_refs(&data);
        let config = MixtureConfig {
            n_components: 5,
            ..Default::default()
        };
        assert!(gaussian_mixture(&refs, &config).is_err());
    }

    #[test]
    fn derive_seed_differs_per_unit() {
        let a = derive_seed(42, 0);
        let b = derive_seed(42, 1);
        assert_ne!(a, b);
        assert_eq!(a, derive_seed(42, 0));
    }
}
