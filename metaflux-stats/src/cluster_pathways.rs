//! Per-cluster pathway over-representation.
//!
//! Given a clustering of samples and their pathway-disruption profiles, asks
//! for each (cluster, pathway) pair whether disruption inside the cluster is
//! stochastically greater than outside it. All pairs are corrected together
//! as one family before significance is called.

use std::collections::{BTreeMap, BTreeSet};

use metaflux_core::{MetafluxError, Result, Summarizable};

use crate::correction::{adjust_nested, significant};
use crate::testing::mann_whitney_greater;

/// Adjusted p-value threshold used when callers have no reason to deviate.
pub const DEFAULT_SIGNIFICANCE: f64 = 0.1;

/// Fraction of the cohort's peak impact below which a pathway does not count
/// as disrupted in a sample.
const IMPACT_FLOOR_FRACTION: f64 = 0.05;

/// Sample id → (pathway id → disruption impact).
pub type DisruptionProfiles = BTreeMap<String, BTreeMap<String, f64>>;

/// Outcome of a per-cluster pathway enrichment run.
///
/// Outer keys are cluster labels rendered as strings; inner keys are pathway
/// ids. Pathways with no in-cluster signal are absent, not zero.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterPathwayReport {
    /// Raw one-sided p-values per (cluster, pathway).
    pub p_values: BTreeMap<String, BTreeMap<String, f64>>,
    /// Benjamini-Hochberg adjusted p-values, pooled across all clusters.
    pub adjusted: BTreeMap<String, BTreeMap<String, f64>>,
    /// Pathways whose adjusted p-value is at or below the threshold, per
    /// cluster, in pathway order.
    pub significant: BTreeMap<String, Vec<String>>,
}

impl Summarizable for ClusterPathwayReport {
    fn summary(&self) -> String {
        let tested: usize = self.p_values.values().map(BTreeMap::len).sum();
        let hits: usize = self.significant.values().map(Vec::len).sum();
        format!(
            "ClusterPathwayReport: {} clusters, {} tests, {} significant",
            self.p_values.len(),
            tested,
            hits,
        )
    }
}

/// Test every pathway for over-representation in every cluster.
///
/// `sample_ids[i]` carries cluster `labels[i]`; each id must appear in
/// `profiles`. Within a cluster, a pathway whose in-cluster impacts are all
/// zero is skipped. The remaining pairs are tested one-sided in-cluster
/// versus rest, adjusted as one family, and filtered at `threshold`.
pub fn cluster_pathway_enrichment(
    profiles: &DisruptionProfiles,
    sample_ids: &[String],
    labels: &[usize],
    threshold: f64,
) -> Result<ClusterPathwayReport> {
    validate_cohort(profiles, sample_ids, labels)?;

    let universe = nonzero_pathways(profiles, sample_ids);
    let distinct: BTreeSet<usize> = labels.iter().copied().collect();

    let mut p_values: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for &cluster in &distinct {
        let mut cluster_p = BTreeMap::new();
        for pathway in &universe {
            let mut inside = Vec::new();
            let mut outside = Vec::new();
            for (sample, &label) in sample_ids.iter().zip(labels) {
                let v = impact_of(profiles, sample, pathway);
                if label == cluster {
                    inside.push(v);
                } else {
                    outside.push(v);
                }
            }
            if inside.iter().all(|&v| v == 0.0) {
                continue;
            }
            let test = mann_whitney_greater(&inside, &outside)?;
            cluster_p.insert(pathway.clone(), test.p_value);
        }
        p_values.insert(cluster.to_string(), cluster_p);
    }

    let adjusted = adjust_nested(&p_values, threshold)?;
    let hits = adjusted
        .iter()
        .map(|(cluster, inner)| (cluster.clone(), significant(inner, threshold)))
        .collect();

    Ok(ClusterPathwayReport {
        p_values,
        adjusted,
        significant: hits,
    })
}

/// Pathways disrupted in more than `fraction` of each cluster's samples.
///
/// A pathway counts as disrupted in a sample when its impact reaches 5% of
/// the largest impact anywhere in the cohort. This is a descriptive
/// companion to [`cluster_pathway_enrichment`]; no hypothesis test is
/// involved.
pub fn frequent_pathways(
    profiles: &DisruptionProfiles,
    sample_ids: &[String],
    labels: &[usize],
    fraction: f64,
) -> Result<BTreeMap<String, Vec<String>>> {
    validate_cohort(profiles, sample_ids, labels)?;
    if !(0.0..=1.0).contains(&fraction) {
        return Err(MetafluxError::Config(format!(
            "frequency threshold must be in [0, 1], got {}",
            fraction
        )));
    }

    let universe = nonzero_pathways(profiles, sample_ids);
    let distinct: BTreeSet<usize> = labels.iter().copied().collect();
    let floor = sample_ids
        .iter()
        .map(|sample| peak_impact(profiles, sample))
        .fold(0.0, f64::max)
        * IMPACT_FLOOR_FRACTION;

    let mut out = BTreeMap::new();
    for &cluster in &distinct {
        let members: Vec<&String> = sample_ids
            .iter()
            .zip(labels)
            .filter(|(_, &label)| label == cluster)
            .map(|(sample, _)| sample)
            .collect();

        let mut hits = Vec::new();
        for pathway in &universe {
            let disrupted = members
                .iter()
                .filter(|&sample| impact_of(profiles, sample, pathway) >= floor)
                .count();
            if disrupted as f64 / members.len() as f64 > fraction {
                hits.push(pathway.clone());
            }
        }
        out.insert(cluster.to_string(), hits);
    }
    Ok(out)
}

fn validate_cohort(
    profiles: &DisruptionProfiles,
    sample_ids: &[String],
    labels: &[usize],
) -> Result<()> {
    if sample_ids.len() != labels.len() {
        return Err(MetafluxError::ShapeMismatch(format!(
            "{} sample ids but {} labels",
            sample_ids.len(),
            labels.len()
        )));
    }
    for sample in sample_ids {
        if !profiles.contains_key(sample) {
            return Err(MetafluxError::InvalidInput(format!(
                "sample '{}' has no disruption profile",
                sample
            )));
        }
    }
    let distinct: BTreeSet<usize> = labels.iter().copied().collect();
    if distinct.len() < 2 {
        return Err(MetafluxError::InvalidInput(
            "need at least 2 distinct cluster labels".into(),
        ));
    }
    Ok(())
}

/// Sorted pathways carrying non-zero impact in at least one cohort sample.
fn nonzero_pathways(profiles: &DisruptionProfiles, sample_ids: &[String]) -> Vec<String> {
    let mut keys = BTreeSet::new();
    for sample in sample_ids {
        if let Some(impacts) = profiles.get(sample) {
            for (pathway, &v) in impacts {
                if v != 0.0 {
                    keys.insert(pathway.clone());
                }
            }
        }
    }
    keys.into_iter().collect()
}

fn impact_of(profiles: &DisruptionProfiles, sample: &str, pathway: &str) -> f64 {
    profiles
        .get(sample)
        .and_then(|impacts| impacts.get(pathway))
        .copied()
        .unwrap_or(0.0)
}

fn peak_impact(profiles: &DisruptionProfiles, sample: &str) -> f64 {
    profiles
        .get(sample)
        .map(|impacts| impacts.values().copied().fold(0.0, f64::max))
        .unwrap_or(0.0)
}

// ── Tests ──────────────────────────────────────────────────────────────────
