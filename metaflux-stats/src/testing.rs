//! Hypothesis testing.
//!
//! Provides the one-sided Mann-Whitney U test used to ask whether disruption
//! scores inside a cluster sit above those outside it.

use metaflux_core::{MetafluxError, Result, Scored, Summarizable};

/// Result of a hypothesis test.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TestResult {
    /// The test statistic (U for Mann-Whitney).
    pub statistic: f64,
    /// One-sided p-value.
    pub p_value: f64,
    /// Name of the test method.
    pub method: String,
}

impl Scored for TestResult {
    fn score(&self) -> f64 {
        self.p_value
    }
}

impl Summarizable for TestResult {
    fn summary(&self) -> String {
        format!(
            "{}: statistic={:.4}, p={:.6}",
            self.method, self.statistic, self.p_value,
        )
    }
}

// ── Mann-Whitney U test ────────────────────────────────────────────────────

/// One-sided Mann-Whitney U test with alternative "x stochastically greater
/// than y".
///
/// Uses the normal approximation with tie-corrected variance and a 0.5
/// continuity correction. When every observation is identical the variance
/// collapses and the p-value is 1.0.
///
/// Each group must be non-empty.
pub fn mann_whitney_greater(x: &[f64], y: &[f64]) -> Result<TestResult> {
    if x.is_empty() || y.is_empty() {
        return Err(MetafluxError::InvalidInput(
            "mann_whitney_greater: each group must be non-empty".into(),
        ));
    }
    let nx = x.len();
    let ny = y.len();
    let n = nx + ny;

    let mut combined: Vec<f64> = Vec::with_capacity(n);
    combined.extend_from_slice(x);
    combined.extend_from_slice(y);
    let (ranks, tie_term) = midranks(&combined);

    let r1: f64 = ranks[..nx].iter().sum();
    let u1 = r1 - (nx * (nx + 1)) as f64 / 2.0;

    let mu = (nx * ny) as f64 / 2.0;
    let n_f = n as f64;
    let variance =
        (nx * ny) as f64 / 12.0 * ((n_f + 1.0) - tie_term / (n_f * (n_f - 1.0)));
    let sigma = variance.max(0.0).sqrt();

    let p = if sigma > 0.0 {
        // Continuity correction pulls the statistic half a rank toward the
        // mean before standardizing.
        let z = (u1 - mu - 0.5) / sigma;
        normal_sf(z)
    } else {
        1.0
    };

    Ok(TestResult {
        statistic: u1,
        p_value: p.clamp(0.0, 1.0),
        method: "Mann-Whitney U test (greater)".into(),
    })
}

/// Midranks for `values` (ties share the average of their rank positions),
/// plus the tie-correction term sum(t^3 - t) over tie groups.
fn midranks(values: &[f64]) -> (Vec<f64>, f64) {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j (0-based) share the midrank.
        let midrank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = midrank;
        }
        let t = (j - i + 1) as f64;
        tie_term += t * t * t - t;
        i = j + 1;
    }

    (ranks, tie_term)
}

/// Upper-tail probability of the standard normal.
fn normal_sf(z: f64) -> f64 {
    0.5 * (1.0 - erf(z / std::f64::consts::SQRT_2))
}

/// Error function via the Abramowitz & Stegun 7.1.26 rational approximation
/// (absolute error below 1.5e-7).
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t) * (-x * x).exp();
    sign * y
}

// ── Tests ──────────────────────────────────────────────────────────────────
