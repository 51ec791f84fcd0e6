//! Cluster-count selection.
//!
//! Sweeps candidate cluster counts for a chosen algorithm, scores each
//! candidate with the negated silhouette coefficient under the fitting
//! metric, and reports the winning labeling together with the set of
//! candidates whose score is statistically indistinguishable from the best.

use metaflux_core::{MetafluxError, Result, Summarizable};

use crate::cluster::{derive_seed, gaussian_mixture, kmeans, KMeansConfig, MixtureConfig};
use crate::distance::DistanceMetric;
use crate::evaluate::silhouette_score;
use crate::spectral;

/// Hard ceiling on the candidate cluster count, regardless of sample count.
const K_CEILING: usize = 50;

/// Fraction of the best validity score that still counts as "near-optimal".
const TIE_BAND_FRACTION: f64 = 0.05;

/// Which clustering algorithm the selector drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Algorithm {
    /// Centroid partitioning (k-means).
    Partition,
    /// Gaussian mixture with per-sample membership probabilities.
    Mixture,
    /// Spectral embedding followed by partitioning.
    Spectral,
}

/// Configuration for a selection run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectorConfig {
    pub algorithm: Algorithm,
    /// Upper bound of the sweep; further capped by `n_samples - 1` and 50.
    pub k_max: usize,
    /// Skip the sweep and refit once at this count.
    pub k_fixed: Option<usize>,
    /// Distance metric for fitting and validity scoring (Euclidean for
    /// numeric vectors, Jaccard for binary ones).
    pub metric: DistanceMetric,
    pub seed: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Partition,
            k_max: 10,
            k_fixed: None,
            metric: DistanceMetric::Euclidean,
            seed: 10,
        }
    }
}

/// The single authoritative clustering of a run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusteringResult {
    /// Cluster label per sample; ordinals with no meaning across runs.
    pub labels: Vec<usize>,
    /// Per-sample probability over labels; mixture fitting only.
    pub responsibilities: Option<Vec<Vec<f64>>>,
}

impl Summarizable for ClusteringResult {
    fn summary(&self) -> String {
        let k = self.labels.iter().copied().max().map_or(0, |m| m + 1);
        format!("Clustering: {} samples, {} clusters", self.labels.len(), k)
    }
}

/// Validity scores from a sweep.
///
/// Validity is the negated silhouette, so lower is better and the best score
/// is the minimum.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidityRecord {
    /// (candidate k, negated silhouette) in sweep order.
    pub scores: Vec<(usize, f64)>,
    /// Candidate with the minimum validity score.
    pub best_k: usize,
    /// Candidates within 5% of the best score, best included. Supplementary
    /// information for the caller; never silently substituted for `best_k`.
    pub near_optimal: Vec<usize>,
}

impl Summarizable for ValidityRecord {
    fn summary(&self) -> String {
        format!(
            "Validity: best k={}, {} candidates, {} near-optimal",
            self.best_k,
            self.scores.len(),
            self.near_optimal.len(),
        )
    }
}

/// Select a clustering for `data`.
///
/// With `k_fixed` unset, sweeps k = 2..=min(k_max, n-1, 50), scores every
/// candidate, and returns the best labeling plus the full [`ValidityRecord`].
/// With `k_fixed` set, refits once at that count and returns no record.
pub fn select(
    data: &[&[f64]],
    config: &SelectorConfig,
) -> Result<(ClusteringResult, Option<ValidityRecord>)> {
    let n = data.len();

    if let Some(k) = config.k_fixed {
        if k < 2 || k + 1 > n {
            return Err(MetafluxError::Config(format!(
                "fixed k ({}) outside [2, n_samples - 1 ({})]",
                k,
                n.saturating_sub(1)
            )));
        }
        let (labels, responsibilities) = fit_at(data, k, config)?;
        return Ok((
            ClusteringResult {
                labels,
                responsibilities,
            },
            None,
        ));
    }

    if n < 3 {
        return Err(MetafluxError::Config(format!(
            "validity sweep needs at least 3 usable samples, got {}",
            n
        )));
    }
    let k_hi = config.k_max.min(n - 1).min(K_CEILING);
    if k_hi < 2 {
        return Err(MetafluxError::Config(format!(
            "no candidate cluster counts in [2, {}]",
            k_hi
        )));
    }

    let candidates: Vec<usize> = (2..=k_hi).collect();

    // Every candidate fit is independent; aggregation below is a
    // deterministic reduction over the collected results.
    #[cfg(feature = "parallel")]
    let fits = {
        use rayon::prelude::*;
        candidates
            .par_iter()
            .map(|&k| score_candidate(data, k, config))
            .collect::<Result<Vec<_>>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let fits = candidates
        .iter()
        .map(|&k| score_candidate(data, k, config))
        .collect::<Result<Vec<_>>>()?;

    let scores: Vec<(usize, f64)> = candidates
        .iter()
        .zip(&fits)
        .map(|(&k, (score, _, _))| (k, *score))
        .collect();
    for &(k, score) in &scores {
        log::debug!("cluster-count sweep: k={} validity={:.6}", k, score);
    }
    let (best_k, near_optimal) = near_optimal_band(&scores)?;

    let mut best_idx = 0;
    for (i, (k, _)) in scores.iter().enumerate() {
        if *k == best_k {
            best_idx = i;
            break;
        }
    }
    let (_, labels, responsibilities) = fits.into_iter().nth(best_idx).ok_or_else(|| {
        MetafluxError::InvalidInput("candidate fit missing for selected k".into())
    })?;

    Ok((
        ClusteringResult {
            labels,
            responsibilities,
        },
        Some(ValidityRecord {
            scores,
            best_k,
            near_optimal,
        }),
    ))
}

/// Fit one candidate and compute its negated-silhouette validity.
#[allow(clippy::type_complexity)]
fn score_candidate(
    data: &[&[f64]],
    k: usize,
    config: &SelectorConfig,
) -> Result<(f64, Vec<usize>, Option<Vec<Vec<f64>>>)> {
    let (labels, responsibilities) = fit_at(data, k, config)?;
    let validity = -silhouette_score(data, &labels, config.metric)?;
    Ok((validity, labels, responsibilities))
}

/// The single dispatch point between algorithms.
#[allow(clippy::type_complexity)]
fn fit_at(
    data: &[&[f64]],
    k: usize,
    config: &SelectorConfig,
) -> Result<(Vec<usize>, Option<Vec<Vec<f64>>>)> {
    match config.algorithm {
        Algorithm::Partition => {
            let fit = kmeans(
                data,
                &KMeansConfig {
                    n_clusters: k,
                    seed: config.seed,
                    ..Default::default()
                },
            )?;
            Ok((fit.labels, None))
        }
        Algorithm::Mixture => {
            // Each sweep unit gets its own base seed; restarts derive
            // further per-attempt seeds inside the fitter.
            let fit = gaussian_mixture(
                data,
                &MixtureConfig {
                    n_components: k,
                    seed: derive_seed(config.seed, k as u64),
                    ..Default::default()
                },
            )?;
            Ok((fit.labels, Some(fit.responsibilities)))
        }
        Algorithm::Spectral => {
            let labels = spectral::embed_and_partition(data, k, config.metric)?;
            Ok((labels, None))
        }
    }
}

/// Find the best candidate and the near-optimal tie band.
///
/// Best is the minimum score; near-optimal candidates differ from it by less
/// than 5% of its magnitude.
pub fn near_optimal_band(scores: &[(usize, f64)]) -> Result<(usize, Vec<usize>)> {
    if scores.is_empty() {
        return Err(MetafluxError::Config("no validity scores to rank".into()));
    }
    let (mut best_k, mut best) = scores[0];
    for &(k, score) in &scores[1..] {
        if score < best {
            best = score;
            best_k = k;
        }
    }
    let band = best.abs() * TIE_BAND_FRACTION;
    let near_optimal = scores
        .iter()
        .filter(|(_, score)| (best - score).abs() < band)
        .map(|&(k, _)| k)
        .collect();
    Ok((best_k, near_optimal))
}
