//! Monte-Carlo null models for pathway enrichment.
//!
//! Observed cohorts report, per sample, a bag of gene-loss magnitudes landing
//! on specific pathways. The null model asks how often random gene loss of
//! the same shape would hit each pathway: every trial redraws each sample's
//! losses onto genes sampled uniformly (with replacement) from the background
//! universe, keeping the observed magnitudes.

use std::collections::{BTreeMap, BTreeSet};

use metaflux_core::{MetafluxError, Result};

/// Trial count giving p-value resolution of 1e-5.
pub const DEFAULT_TRIALS: usize = 100_000;

// ── Xorshift64 PRNG ────────────────────────────────────────────────────────

/// Minimal xorshift64 PRNG for reproducible simulations without external deps.
struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    fn next_bounded(&mut self, n: usize) -> usize {
        (self.next_u64() as usize) % n
    }
}

// ── Null distributions ─────────────────────────────────────────────────────

/// Per-pathway null distributions from one simulation run.
///
/// Each vector has `trials` entries, one per Monte-Carlo trial. Every pathway
/// in the membership map gets an entry, including pathways no trial ever hit.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NullDistributions {
    /// Number of distinct samples hitting the pathway in each trial. A
    /// sample counts once per pathway per trial no matter how many of its
    /// losses land there.
    pub patient: BTreeMap<String, Vec<f64>>,
    /// Total loss magnitude landing in the pathway in each trial.
    pub gene: BTreeMap<String, Vec<f64>>,
    pub trials: usize,
}

impl NullDistributions {
    /// Empirical patient-level p-value per observed pathway.
    pub fn patient_p_values(&self, observed: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        self.p_values(&self.patient, observed)
    }

    /// Empirical gene-level p-value per observed pathway.
    pub fn gene_p_values(&self, observed: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        self.p_values(&self.gene, observed)
    }

    fn p_values(
        &self,
        nulls: &BTreeMap<String, Vec<f64>>,
        observed: &BTreeMap<String, f64>,
    ) -> BTreeMap<String, f64> {
        observed
            .iter()
            .map(|(pathway, &obs)| {
                let null = nulls.get(pathway).map(Vec::as_slice).unwrap_or(&[]);
                (pathway.clone(), empirical_p(null, obs))
            })
            .collect()
    }
}

/// Simulate null distributions for pathway hit statistics.
///
/// `background` is the gene universe draws come from. `loss_magnitudes` holds
/// one bag of observed magnitudes per sample; each trial reassigns every
/// magnitude to a uniformly random background gene. `membership` maps pathway
/// id to the set of gene ids it contains.
pub fn simulate(
    background: &[String],
    loss_magnitudes: &[Vec<f64>],
    membership: &BTreeMap<String, BTreeSet<String>>,
    trials: usize,
    seed: u64,
) -> Result<NullDistributions> {
    if background.is_empty() {
        return Err(MetafluxError::Config(
            "background gene universe must be non-empty".into(),
        ));
    }

    // Reverse index: gene → pathways containing it.
    let mut gene_pathways: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
    for (pathway, genes) in membership {
        for gene in genes {
            gene_pathways.entry(gene.as_str()).or_default().push(pathway);
        }
    }

    let mut patient: BTreeMap<String, Vec<f64>> = membership
        .keys()
        .map(|k| (k.clone(), Vec::with_capacity(trials)))
        .collect();
    let mut gene: BTreeMap<String, Vec<f64>> = patient.clone();

    let mut rng = Xorshift64::new(seed);
    for _ in 0..trials {
        let mut patient_hits: BTreeMap<&str, f64> = BTreeMap::new();
        let mut gene_impact: BTreeMap<&str, f64> = BTreeMap::new();

        for magnitudes in loss_magnitudes {
            let mut sample_hit: BTreeSet<&str> = BTreeSet::new();
            for &magnitude in magnitudes {
                let drawn = &background[rng.next_bounded(background.len())];
                if let Some(pathways) = gene_pathways.get(drawn.as_str()) {
                    for pathway in pathways {
                        *gene_impact.entry(pathway.as_str()).or_insert(0.0) += magnitude;
                        sample_hit.insert(pathway.as_str());
                    }
                }
            }
            for pathway in sample_hit {
                *patient_hits.entry(pathway).or_insert(0.0) += 1.0;
            }
        }

        for (pathway, null) in patient.iter_mut() {
            null.push(patient_hits.get(pathway.as_str()).copied().unwrap_or(0.0));
        }
        for (pathway, null) in gene.iter_mut() {
            null.push(gene_impact.get(pathway.as_str()).copied().unwrap_or(0.0));
        }
    }

    Ok(NullDistributions {
        patient,
        gene,
        trials,
    })
}

/// Observed pathway statistics paired with their empirical p-values.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnrichmentPValues {
    pub patient: BTreeMap<String, f64>,
    pub gene: BTreeMap<String, f64>,
}

/// Simulate and score in one step, dropping the null vectors afterwards.
///
/// Convenience over [`simulate`] for callers who only want the p-values;
/// the per-trial null distributions are freed once both maps are extracted.
pub fn enrichment_p_values(
    background: &[String],
    loss_magnitudes: &[Vec<f64>],
    membership: &BTreeMap<String, BTreeSet<String>>,
    observed_patient: &BTreeMap<String, f64>,
    observed_gene: &BTreeMap<String, f64>,
    trials: usize,
    seed: u64,
) -> Result<EnrichmentPValues> {
    let nulls = simulate(background, loss_magnitudes, membership, trials, seed)?;
    Ok(EnrichmentPValues {
        patient: nulls.patient_p_values(observed_patient),
        gene: nulls.gene_p_values(observed_gene),
    })
}

/// Fraction of null draws at or above the observed statistic.
///
/// An empty null distribution cannot rank anything and yields the
/// conservative p of 1.0.
pub fn empirical_p(null: &[f64], observed: f64) -> f64 {
    if null.is_empty() {
        log::warn!("empty null distribution, defaulting p-value to 1.0");
        return 1.0;
    }
    null.iter().filter(|&&v| v >= observed).count() as f64 / null.len() as f64
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn genes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn membership(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        entries
            .iter()
            .map(|(p, gs)| {
                (
                    p.to_string(),
                    gs.iter().map(|g| g.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn empirical_p_counts_at_or_above() {
        let null: Vec<f64> = (0..10).map(|v| v as f64).collect();
        assert!((empirical_p(&null, 7.0) - 0.3).abs() < 1e-12);
        assert!((empirical_p(&null, 0.0) - 1.0).abs() < 1e-12);
        assert!((empirical_p(&null, 100.0) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn empirical_p_empty_null_is_one() {
        assert_eq!(empirical_p(&[], 3.0), 1.0);
    }

    #[test]
    fn full_coverage_pathway_hits_every_trial() {
        // One pathway containing the whole universe: every draw lands in it,
        // so the null is exact regardless of the random stream.
        let background = genes(&["g1", "g2", "g3"]);
        let m = membership(&[("map_all", &["g1", "g2", "g3"])]);
        let losses = vec![vec![1.0, 2.0], vec![4.0]];
        let nulls = simulate(&background, &losses, &m, 25, 7).unwrap();

        assert_eq!(nulls.trials, 25);
        assert_eq!(nulls.patient["map_all"], vec![2.0; 25]);
        assert_eq!(nulls.gene["map_all"], vec![7.0; 25]);
    }

    #[test]
    fn unreachable_pathway_stays_zero() {
        let background = genes(&["g1", "g2"]);
        let m = membership(&[("map_far", &["g99"])]);
        let losses = vec![vec![1.0], vec![1.0]];
        let nulls = simulate(&background, &losses, &m, 10, 42).unwrap();

        assert_eq!(nulls.patient["map_far"], vec![0.0; 10]);
        // Observing any hit at all against an all-zero null is maximally rare.
        let observed: BTreeMap<String, f64> = [("map_far".to_string(), 1.0)].into();
        assert_eq!(nulls.patient_p_values(&observed)["map_far"], 0.0);
    }

    #[test]
    fn patient_counted_once_per_pathway() {
        // A single sample with many losses can never push the patient count
        // above 1.
        let background = genes(&["g1"]);
        let m = membership(&[("map_one", &["g1"])]);
        let losses = vec![vec![1.0, 1.0, 1.0, 1.0]];
        let nulls = simulate(&background, &losses, &m, 5, 3).unwrap();
        assert_eq!(nulls.patient["map_one"], vec![1.0; 5]);
        assert_eq!(nulls.gene["map_one"], vec![4.0; 5]);
    }

    #[test]
    fn reproducible_with_seed() {
        let background = genes(&["g1", "g2", "g3", "g4", "g5"]);
        let m = membership(&[("map_a", &["g1", "g2"]), ("map_b", &["g4"])]);
        let losses = vec![vec![1.0, 2.0], vec![3.0], vec![0.5, 0.5]];
        let a = simulate(&background, &losses, &m, 50, 11).unwrap();
        let b = simulate(&background, &losses, &m, 50, 11).unwrap();
        assert_eq!(a.patient, b.patient);
        assert_eq!(a.gene, b.gene);

        let c = simulate(&background, &losses, &m, 50, 12).unwrap();
        assert!(a.gene != c.gene || a.patient != c.patient);
    }

    #[test]
    fn empty_background_rejected() {
        let m = membership(&[("map_a", &["g1"])]);
        assert!(simulate(&[], &[vec![1.0]], &m, 10, 1).is_err());
    }

    #[test]
    fn zero_trials_degrades_to_p_one() {
        let m = membership(&[("map_a", &["g1"])]);
        let nulls = simulate(&genes(&["g1"]), &[vec![1.0]], &m, 0, 1).unwrap();
        assert!(nulls.patient["map_a"].is_empty());
        let observed: BTreeMap<String, f64> = [("map_a".to_string(), 1.0)].into();
        assert_eq!(nulls.patient_p_values(&observed)["map_a"], 1.0);
    }

    #[test]
    fn convenience_matches_explicit_path() {
        let background = genes(&["g1", "g2", "g3"]);
        let m = membership(&[("map_all", &["g1", "g2", "g3"])]);
        let losses = vec![vec![1.0, 2.0], vec![4.0]];
        let observed: BTreeMap<String, f64> = [("map_all".to_string(), 2.0)].into();

        let nulls = simulate(&background, &losses, &m, 25, 7).unwrap();
        let combined =
            enrichment_p_values(&background, &losses, &m, &observed, &observed, 25, 7)
                .unwrap();
        assert_eq!(combined.patient, nulls.patient_p_values(&observed));
        assert_eq!(combined.gene, nulls.gene_p_values(&observed));
    }

    #[test]
    fn p_values_align_with_observed_keys() {
        let background = genes(&["g1", "g2"]);
        let m = membership(&[("map_a", &["g1", "g2"])]);
        let losses = vec![vec![1.0]];
        let nulls = simulate(&background, &losses, &m, 10, 5).unwrap();

        let observed: BTreeMap<String, f64> =
            [("map_a".to_string(), 1.0), ("map_missing".to_string(), 2.0)].into();
        let p = nulls.patient_p_values(&observed);
        assert_eq!(p.len(), 2);
        // Full-coverage pathway: null is all ones, observing 1 gives p = 1.
        assert_eq!(p["map_a"], 1.0);
        // Unknown pathway falls back to the empty-null default.
        assert_eq!(p["map_missing"], 1.0);
    }
}
