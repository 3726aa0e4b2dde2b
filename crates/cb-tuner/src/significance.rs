//! Rank-based significance testing of a candidate distribution against the
//! baseline.
//!
//! Solver runtimes are right-skewed, so normality is not assumed: the test is
//! a two-sample Mann-Whitney U with normal approximation, tie correction, and
//! continuity correction. Sample sizes may differ between the two sides (a
//! consequence of adaptive stopping). The comparison is a pure function of
//! its inputs: re-running it on the same frozen pair yields the same verdict.

use serde::{Deserialize, Serialize};

use cb_types::SampleDistribution;

/// Per-test confidence level used when the caller has no stricter preference.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Outcome of comparing a candidate distribution against the baseline.
///
/// `significant` is the boolean verdict at the alpha the test was run with;
/// the raw `p_value` is always exposed so downstream consumers can apply a
/// stricter threshold (many tests share one baseline, which inflates the
/// run-wide false-positive rate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Candidate mean minus baseline mean. Negative is an improvement when
    /// minimizing, positive when maximizing.
    pub effect_size: f64,
    /// Two-tailed p-value of the rank test.
    pub p_value: f64,
    pub significant: bool,
    pub candidate_mean: f64,
    pub baseline_mean: f64,
}

/// Abramowitz & Stegun approximation 26.2.17 for the standard normal CDF.
fn normal_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }
    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let d = 0.3989422804014327; // 1/sqrt(2*pi)
    let p = d
        * (-x * x / 2.0).exp()
        * (t * (0.3193815 + t * (-0.3565638 + t * (1.781478 + t * (-1.8212560 + t * 1.3302744)))));
    if x > 0.0 {
        1.0 - p
    } else {
        p
    }
}

/// Mann-Whitney U statistic of the candidate sample, plus the tie-corrected
/// variance of U under the null hypothesis.
fn rank_statistics(candidate: &[f64], baseline: &[f64]) -> (f64, f64) {
    let n1 = candidate.len();
    let n2 = baseline.len();
    let n = n1 + n2;

    let mut pooled: Vec<(f64, bool)> = candidate
        .iter()
        .map(|&v| (v, true))
        .chain(baseline.iter().map(|&v| (v, false)))
        .collect();
    pooled.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    // Midranks for ties, and the tie-correction term sum(t^3 - t).
    let mut candidate_rank_sum = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        let tie_len = (j - i + 1) as f64;
        // Ranks are 1-based; a run spanning positions i..=j shares the midrank.
        let midrank = (i + 1 + j + 1) as f64 / 2.0;
        for entry in &pooled[i..=j] {
            if entry.1 {
                candidate_rank_sum += midrank;
            }
        }
        tie_term += tie_len * tie_len * tie_len - tie_len;
        i = j + 1;
    }

    let n1f = n1 as f64;
    let n2f = n2 as f64;
    let nf = n as f64;
    let u = candidate_rank_sum - n1f * (n1f + 1.0) / 2.0;
    let variance = if n < 2 {
        0.0
    } else {
        n1f * n2f / 12.0 * ((nf + 1.0) - tie_term / (nf * (nf - 1.0)))
    };
    (u, variance)
}

/// Compare a candidate's frozen distribution against the frozen baseline.
///
/// Degenerate cases never raise: with an empty sample on either side, or a
/// completely tied pooled sample (zero rank variance, e.g. every run timed
/// out at the same penalty on both sides), the verdict falls back to direct
/// mean comparison (then necessarily a tie) with `p = 1`.
pub fn compare(candidate: &SampleDistribution, baseline: &SampleDistribution, alpha: f64) -> Comparison {
    let candidate_mean = candidate.mean();
    let baseline_mean = baseline.mean();
    let effect_size = if candidate.is_empty() || baseline.is_empty() {
        0.0
    } else {
        candidate_mean - baseline_mean
    };

    if candidate.is_empty() || baseline.is_empty() {
        return Comparison {
            effect_size,
            p_value: 1.0,
            significant: false,
            candidate_mean,
            baseline_mean,
        };
    }

    let cand: Vec<f64> = candidate.objectives().collect();
    let base: Vec<f64> = baseline.objectives().collect();
    let (u, variance) = rank_statistics(&cand, &base);

    if variance <= 0.0 {
        return Comparison {
            effect_size,
            p_value: 1.0,
            significant: false,
            candidate_mean,
            baseline_mean,
        };
    }

    let mu = cand.len() as f64 * base.len() as f64 / 2.0;
    let z = ((u - mu).abs() - 0.5).max(0.0) / variance.sqrt();
    let p_value = (2.0 * (1.0 - normal_cdf(z))).clamp(0.0, 1.0);

    Comparison {
        effect_size,
        p_value,
        significant: p_value < alpha,
        candidate_mean,
        baseline_mean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_types::{Measurement, RunStatus};

    fn dist(values: &[f64]) -> SampleDistribution {
        let mut d = SampleDistribution::new();
        for &v in values {
            d.push(Measurement::new(v, RunStatus::Optimal));
        }
        d
    }

    fn timeout_dist(penalty: f64, count: usize) -> SampleDistribution {
        let mut d = SampleDistribution::new();
        for _ in 0..count {
            d.push(Measurement::new(penalty, RunStatus::Timeout));
        }
        d
    }

    #[test]
    fn clear_improvement_is_significant() {
        // Baseline solves in 10s, candidate in 2s.
        let baseline = dist(&[10.0, 10.0, 10.0, 10.0, 10.0]);
        let candidate = dist(&[2.0, 2.0, 2.0, 2.0, 2.0]);
        let c = compare(&candidate, &baseline, DEFAULT_ALPHA);
        assert!((c.effect_size + 8.0).abs() < 1e-12);
        assert!(c.significant, "p-value {} should be significant", c.p_value);
        assert!(c.p_value < 0.05);
    }

    #[test]
    fn identical_distributions_are_not_significant() {
        let values = [5.0, 6.0, 5.0, 7.0, 6.0, 5.0];
        let c = compare(&dist(&values), &dist(&values), DEFAULT_ALPHA);
        assert!(!c.significant);
        assert!(c.effect_size.abs() < 1e-12);
        assert!(c.p_value > 0.9);
    }

    #[test]
    fn all_timeout_candidate_is_significantly_worse_not_dropped() {
        // Candidate hits the PAR-10 penalty every run; baseline is fast.
        let baseline = dist(&[8.0, 9.5, 10.0, 11.0, 9.0, 10.5]);
        let candidate = timeout_dist(600.0, 5);
        let c = compare(&candidate, &baseline, DEFAULT_ALPHA);
        // Worse in the minimization direction: positive effect, certified.
        assert!(c.effect_size > 0.0);
        assert!(c.significant);
    }

    #[test]
    fn completely_tied_samples_fall_back_to_mean_comparison() {
        let a = timeout_dist(600.0, 4);
        let b = timeout_dist(600.0, 7);
        let c = compare(&a, &b, DEFAULT_ALPHA);
        assert!(!c.significant);
        assert_eq!(c.p_value, 1.0);
        assert!(c.effect_size.abs() < 1e-12);
    }

    #[test]
    fn empty_sample_never_raises() {
        let c = compare(&dist(&[]), &dist(&[1.0, 2.0]), DEFAULT_ALPHA);
        assert!(!c.significant);
        assert_eq!(c.p_value, 1.0);
    }

    #[test]
    fn handles_unequal_sample_sizes() {
        let baseline = dist(&[
            10.0, 10.2, 9.8, 10.1, 9.9, 10.3, 10.0, 9.7, 10.2, 9.9, 10.1, 10.0, 9.8, 10.2, 10.0,
        ]);
        let candidate = dist(&[2.0, 2.1, 1.9, 2.2, 2.0]);
        let c = compare(&candidate, &baseline, DEFAULT_ALPHA);
        assert!(c.significant);
        assert!(c.effect_size < 0.0);
    }

    #[test]
    fn direction_flip_symmetry() {
        // Negating every objective mirrors the ranks: the verdict and p-value
        // must be unchanged and the effect negated.
        let baseline = [10.0, 12.0, 11.0, 13.0, 10.0, 11.5];
        let candidate = [6.0, 7.0, 6.5, 8.0, 7.5];
        let flipped_b: Vec<f64> = baseline.iter().map(|v| -v).collect();
        let flipped_c: Vec<f64> = candidate.iter().map(|v| -v).collect();

        let direct = compare(&dist(&candidate), &dist(&baseline), DEFAULT_ALPHA);
        let flipped = compare(&dist(&flipped_c), &dist(&flipped_b), DEFAULT_ALPHA);

        assert_eq!(direct.significant, flipped.significant);
        assert!((direct.p_value - flipped.p_value).abs() < 1e-9);
        assert!((direct.effect_size + flipped.effect_size).abs() < 1e-9);
    }

    #[test]
    fn comparison_is_idempotent() {
        let baseline = dist(&[10.0, 11.0, 9.0, 12.0, 10.5]);
        let candidate = dist(&[7.0, 8.0, 6.5, 7.5, 8.5]);
        let first = compare(&candidate, &baseline, DEFAULT_ALPHA);
        let second = compare(&candidate, &baseline, DEFAULT_ALPHA);
        assert_eq!(first, second);
    }

    #[test]
    fn stricter_alpha_weakens_verdict() {
        let baseline = dist(&[10.0, 10.0, 10.0, 10.0, 10.0]);
        let candidate = dist(&[2.0, 2.0, 2.0, 2.0, 2.0]);
        let loose = compare(&candidate, &baseline, 0.05);
        let strict = compare(&candidate, &baseline, 1e-9);
        assert!(loose.significant);
        assert!(!strict.significant);
        assert_eq!(loose.p_value, strict.p_value);
    }

    #[test]
    fn normal_cdf_sanity() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!(normal_cdf(-9.0) == 0.0);
        assert!(normal_cdf(9.0) == 1.0);
    }
}
