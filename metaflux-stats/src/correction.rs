//! Multiple testing correction.
//!
//! Per-cluster pathway testing produces one p-value per (cluster, pathway)
//! pair; the whole family is adjusted together with the Benjamini-Hochberg
//! procedure before any significance call is made.

use std::collections::BTreeMap;

use metaflux_core::{MetafluxError, Result};

/// Benjamini-Hochberg procedure for controlling the false discovery rate.
///
/// Sorts p-values, adjusts as `p * n / rank`, enforces monotonicity from
/// right to left, and clamps to [0, 1]. Output order matches input order.
pub fn benjamini_hochberg(p_values: &[f64]) -> Result<Vec<f64>> {
    validate_p_values(p_values)?;
    let n = p_values.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let n_f = n as f64;
    let mut adjusted = vec![0.0; n];

    let mut prev = f64::INFINITY;
    for i in (0..n).rev() {
        let rank = (i + 1) as f64;
        let adj = (p_values[indices[i]] * n_f / rank).min(1.0);
        let adj = adj.min(prev);
        adjusted[indices[i]] = adj;
        prev = adj;
    }

    Ok(adjusted)
}

/// Adjust a keyed collection of p-values as one family.
///
/// `alpha` is the target false discovery rate; it gates nothing here (the
/// adjusted values are threshold-free) but is validated so a bad rate fails
/// at the correction step rather than at the caller's filter.
pub fn adjust_flat(
    p_values: &BTreeMap<String, f64>,
    alpha: f64,
) -> Result<BTreeMap<String, f64>> {
    validate_alpha(alpha)?;

    let keys: Vec<&String> = p_values.keys().collect();
    let flat: Vec<f64> = p_values.values().copied().collect();
    let adjusted = benjamini_hochberg(&flat)?;

    Ok(keys
        .into_iter()
        .zip(adjusted)
        .map(|(k, v)| (k.clone(), v))
        .collect())
}

/// Adjust a nested (cluster → pathway → p) collection as ONE family.
///
/// All p-values across all outer keys are pooled for ranking, then scattered
/// back into the original shape. Adjusting each cluster separately would
/// understate the number of hypotheses tested.
pub fn adjust_nested(
    p_values: &BTreeMap<String, BTreeMap<String, f64>>,
    alpha: f64,
) -> Result<BTreeMap<String, BTreeMap<String, f64>>> {
    validate_alpha(alpha)?;

    let mut flat = Vec::new();
    for inner in p_values.values() {
        flat.extend(inner.values().copied());
    }
    let adjusted = benjamini_hochberg(&flat)?;
    if adjusted.len() != flat.len() {
        return Err(MetafluxError::ShapeMismatch(format!(
            "adjusted {} p-values, expected {}",
            adjusted.len(),
            flat.len()
        )));
    }

    // BTreeMap iteration order is deterministic, so flatten and scatter
    // traverse the same sequence.
    let mut iter = adjusted.into_iter();
    let mut out = BTreeMap::new();
    for (outer, inner) in p_values {
        let rebuilt: BTreeMap<String, f64> = inner
            .keys()
            .zip(&mut iter)
            .map(|(k, v)| (k.clone(), v))
            .collect();
        out.insert(outer.clone(), rebuilt);
    }
    Ok(out)
}

/// Keys whose adjusted p-value is at or below `threshold`, in key order.
pub fn significant(adjusted: &BTreeMap<String, f64>, threshold: f64) -> Vec<String> {
    adjusted
        .iter()
        .filter(|(_, &p)| p <= threshold)
        .map(|(k, _)| k.clone())
        .collect()
}

fn validate_alpha(alpha: f64) -> Result<()> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(MetafluxError::Config(format!(
            "false discovery rate must be in (0, 1], got {}",
            alpha
        )));
    }
    Ok(())
}

fn validate_p_values(p_values: &[f64]) -> Result<()> {
    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(MetafluxError::InvalidInput(format!(
                "p-value at index {} is out of range [0, 1]: {}",
                i, p,
            )));
        }
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────
