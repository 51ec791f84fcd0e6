//! Clustering engines for pathway-disruption profiles.
//!
//! `metaflux-ml` turns per-sample pathway-impact maps into aligned feature
//! matrices and groups samples by the pattern of disruption they share:
//!
//! - **Feature encoding** — aligned numeric and binary vectors over the
//!   pathway universe, degenerate samples filtered
//! - **Distances** — Euclidean and Jaccard metrics, condensed pairwise matrices
//! - **Clustering** — k-means with restarts, diagonal-covariance Gaussian
//!   mixtures with per-sample responsibilities
//! - **Spectral engine** — heat-kernel affinity, normalized Laplacian
//!   embedding, label harmonization via optimal assignment
//! - **Evaluation** — silhouette coefficients under the fitting metric
//! - **Selection** — cluster-count sweep with a near-optimal tie band

pub mod cluster;
pub mod distance;
pub mod encoding;
pub mod evaluate;
pub mod select;
pub mod spectral;
