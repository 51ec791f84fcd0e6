//! Feature encoding for pathway-disruption profiles.
//!
//! Turns per-sample pathway→impact maps into aligned feature matrices over
//! the sorted union of pathways observed with non-zero impact anywhere in the
//! cohort. Samples whose vector carries no signal are dropped: they would
//! only distort distance and validity computations downstream.

use std::collections::{BTreeMap, BTreeSet};

use metaflux_core::Summarizable;

/// Per-sample pathway-impact profiles: sample id → (pathway id → impact).
///
/// Impact scores are non-negative; 0 means the pathway was unaffected.
pub type ImpactProfiles = BTreeMap<String, BTreeMap<String, f64>>;

/// A feature matrix aligned to a fixed pathway ordering.
///
/// `rows[i]` is the vector for `sample_ids[i]`; `rows[i][j]` corresponds to
/// `pathways[j]`. All rows have length `pathways.len()`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureMatrix {
    /// Samples that survived degeneracy filtering, in sorted order.
    pub sample_ids: Vec<String>,
    /// The pathway universe, sorted once and never reordered.
    pub pathways: Vec<String>,
    /// One aligned vector per retained sample.
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Borrow the rows as slices, the layout the clustering engines take.
    pub fn row_refs(&self) -> Vec<&[f64]> {
        self.rows.iter().map(|r| r.as_slice()).collect()
    }
}

impl Summarizable for FeatureMatrix {
    fn summary(&self) -> String {
        format!(
            "FeatureMatrix: {} samples x {} pathways",
            self.sample_ids.len(),
            self.pathways.len(),
        )
    }
}

/// Numeric and binary encodings of the same profile collection.
///
/// Both matrices share one pathway ordering, so column `j` means the same
/// pathway in either.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodedProfiles {
    /// Raw impact scores; a sample is dropped when its row is all zero.
    pub numeric: FeatureMatrix,
    /// Presence flags (1.0 where impact is non-zero); a sample is dropped
    /// when its row has no positive entry.
    pub binary: FeatureMatrix,
}

/// Encode impact profiles into aligned numeric and binary feature matrices.
///
/// The pathway universe is the sorted set of keys carrying a non-zero value
/// in at least one sample. Pathways a sample never reported fill with 0.
/// Empty input produces empty matrices.
pub fn encode(profiles: &ImpactProfiles) -> EncodedProfiles {
    let universe = pathway_universe(profiles);

    let mut numeric = FeatureMatrix {
        sample_ids: Vec::new(),
        pathways: universe.clone(),
        rows: Vec::new(),
    };
    let mut binary = FeatureMatrix {
        sample_ids: Vec::new(),
        pathways: universe.clone(),
        rows: Vec::new(),
    };

    for (sample, impacts) in profiles {
        let mut num_row = Vec::with_capacity(universe.len());
        let mut bin_row = Vec::with_capacity(universe.len());
        for pathway in &universe {
            let v = impacts.get(pathway).copied().unwrap_or(0.0);
            num_row.push(v);
            bin_row.push(if v != 0.0 { 1.0 } else { 0.0 });
        }
        if num_row.iter().any(|&v| v != 0.0) {
            numeric.sample_ids.push(sample.clone());
            numeric.rows.push(num_row);
        }
        if bin_row.iter().any(|&v| v == 1.0) {
            binary.sample_ids.push(sample.clone());
            binary.rows.push(bin_row);
        }
    }

    EncodedProfiles { numeric, binary }
}

/// The sorted set of pathways with non-zero impact in at least one sample.
pub fn pathway_universe(profiles: &ImpactProfiles) -> Vec<String> {
    let mut keys = BTreeSet::new();
    for impacts in profiles.values() {
        for (pathway, &v) in impacts {
            if v != 0.0 {
                keys.insert(pathway.clone());
            }
        }
    }
    keys.into_iter().collect()
}
