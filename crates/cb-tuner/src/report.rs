//! Aggregation of trial records into ranked recommendations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cb_types::{Configuration, DistributionSummary, ObjectiveDirection};

use crate::orchestrator::{TrialRecord, TrialStatus};
use crate::significance::Comparison;

/// One configuration certified as a significant improvement over the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub trial_index: usize,
    pub configuration: Configuration,
    /// Candidate mean minus baseline mean.
    pub effect_size: f64,
    /// Raw p-value of the rank test, for callers applying stricter thresholds.
    pub p_value: f64,
    pub candidate_mean: f64,
}

/// Final output of a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneOutcome {
    pub run_id: Uuid,
    pub direction: ObjectiveDirection,
    pub baseline: DistributionSummary,
    /// Best improvement first. Empty when nothing beat the baseline
    /// significantly, which is a valid expected outcome rather than an error.
    pub recommendations: Vec<Recommendation>,
    /// Refined best configuration with per-parameter contributions, when
    /// refinement was requested and a significant best exists.
    pub refined: Option<crate::ablation::RefinedResult>,
    pub trials_completed: usize,
    pub trials_failed: usize,
}

impl TuneOutcome {
    /// Caveat accompanying every result set: many candidates were tested
    /// against one shared baseline, so the run-wide false-positive rate
    /// exceeds the per-test confidence level, and the sampled instances may
    /// not represent the full problem space. Recommendations are suggestions
    /// for further evaluation, not definitive settings.
    pub fn caveat(&self) -> &'static str {
        "Recommended parameters were obtained by sampling a fixed instance set \
         against a single shared baseline; validate them in larger experiments \
         before adopting them in critical applications."
    }
}

/// Select the recommendations from a run's trial records: completed trials
/// whose comparison is significant and an improvement under `direction`,
/// ordered best improvement first.
pub fn select(records: &[TrialRecord], direction: ObjectiveDirection) -> Vec<Recommendation> {
    let mut picked: Vec<Recommendation> = records
        .iter()
        .filter(|r| r.status == TrialStatus::Completed)
        .filter_map(|r| r.comparison.as_ref().map(|c| (r, c)))
        .filter(|(_, c)| c.significant && is_improvement(c, direction))
        .map(|(r, c)| Recommendation {
            trial_index: r.trial_index,
            configuration: r.configuration.clone(),
            effect_size: c.effect_size,
            p_value: c.p_value,
            candidate_mean: c.candidate_mean,
        })
        .collect();
    sort_best_first(&mut picked, direction);
    picked
}

/// Like [`select`], but re-filtered at a stricter significance level than the
/// one the run was scored with (multiple-comparisons mitigation left to the
/// caller's policy).
pub fn select_with_alpha(
    records: &[TrialRecord],
    direction: ObjectiveDirection,
    alpha: f64,
) -> Vec<Recommendation> {
    let mut picked = select(records, direction);
    picked.retain(|r| r.p_value < alpha);
    picked
}

fn is_improvement(comparison: &Comparison, direction: ObjectiveDirection) -> bool {
    direction.orient(comparison.effect_size) > 0.0
}

fn sort_best_first(recommendations: &mut [Recommendation], direction: ObjectiveDirection) {
    recommendations.sort_by(|a, b| {
        direction
            .orient(b.effect_size)
            .partial_cmp(&direction.orient(a.effect_size))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_types::{Measurement, RunStatus, SampleDistribution};

    fn record(trial_index: usize, effect: f64, p: f64, significant: bool) -> TrialRecord {
        let mut distribution = SampleDistribution::new();
        distribution.push(Measurement::new(10.0 + effect, RunStatus::Optimal));
        let mut r = TrialRecord::new(
            trial_index,
            Configuration::new().with("x", cb_types::ParamValue::Int(trial_index as i64)),
        );
        r.mark_completed(
            distribution,
            Comparison {
                effect_size: effect,
                p_value: p,
                significant,
                candidate_mean: 10.0 + effect,
                baseline_mean: 10.0,
            },
        );
        r
    }

    #[test]
    fn selects_only_significant_improvements() {
        let records = vec![
            record(0, -3.0, 0.01, true),  // improvement, significant
            record(1, -5.0, 0.20, false), // improvement, not significant
            record(2, 4.0, 0.001, true),  // significantly worse
            record(3, 0.0, 1.0, false),   // tie
        ];
        let picked = select(&records, ObjectiveDirection::Minimize);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].trial_index, 0);
    }

    #[test]
    fn orders_best_improvement_first() {
        let records = vec![
            record(0, -2.0, 0.01, true),
            record(1, -8.0, 0.01, true),
            record(2, -5.0, 0.01, true),
        ];
        let picked = select(&records, ObjectiveDirection::Minimize);
        let effects: Vec<f64> = picked.iter().map(|r| r.effect_size).collect();
        assert_eq!(effects, vec![-8.0, -5.0, -2.0]);
    }

    #[test]
    fn maximize_direction_flips_the_improvement_sign() {
        let records = vec![record(0, -3.0, 0.01, true), record(1, 3.0, 0.01, true)];
        let picked = select(&records, ObjectiveDirection::Maximize);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].trial_index, 1);
    }

    #[test]
    fn failed_trials_are_excluded() {
        let mut failed = TrialRecord::new(0, Configuration::new());
        failed.mark_failed("insufficient data".to_string());
        let records = vec![failed, record(1, -3.0, 0.01, true)];
        let picked = select(&records, ObjectiveDirection::Minimize);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].trial_index, 1);
    }

    #[test]
    fn empty_selection_is_a_valid_outcome() {
        let records = vec![record(0, 1.0, 0.5, false)];
        assert!(select(&records, ObjectiveDirection::Minimize).is_empty());
        assert!(select(&[], ObjectiveDirection::Minimize).is_empty());
    }

    #[test]
    fn stricter_alpha_prunes_recommendations() {
        let records = vec![
            record(0, -2.0, 0.04, true),
            record(1, -4.0, 0.0001, true),
        ];
        let loose = select(&records, ObjectiveDirection::Minimize);
        assert_eq!(loose.len(), 2);
        let strict = select_with_alpha(&records, ObjectiveDirection::Minimize, 0.001);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].trial_index, 1);
    }
}
