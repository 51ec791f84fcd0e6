//! Statistical methods for the metaflux pathway-analysis workspace.
//!
//! - **Hypothesis testing** — one-sided Mann-Whitney U for disruption scores
//! - **Multiple testing correction** — Benjamini-Hochberg over flat and
//!   per-cluster keyed collections
//! - **Enrichment null models** — Monte-Carlo simulation of pathway hit
//!   counts under random gene loss
//! - **Cluster profiling** — per-cluster pathway over-representation reports

pub mod cluster_pathways;
pub mod correction;
pub mod enrichment;
pub mod testing;
