//! The tuning run: baseline, then propose/evaluate/score/record per trial.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use cb_types::{
    Configuration, ObjectiveDirection, ParameterSpace, SampleDistribution, TuneError, TuneResult,
};

use crate::ablation;
use crate::baseline;
use crate::report::{self, TuneOutcome};
use crate::runner::{InstanceId, MeasurementSource};
use crate::sampler::{AdaptiveSampler, SamplerSettings};
use crate::significance::{self, Comparison, DEFAULT_ALPHA};
use crate::suggest::Suggester;

/// Caller-facing options for one tuning run.
///
/// Defaults mirror a typical time-to-optimal setup: PAR-10 timeout penalty,
/// 10-sample minimum per candidate, 30-sample verification budget, 100
/// trials, 95% per-test confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneOptions {
    /// Representative problem instances; measurements round-robin over them.
    pub instances: Vec<InstanceId>,
    /// Time budget per solver run, in seconds.
    pub time_limit_secs: f64,
    pub direction: ObjectiveDirection,
    /// Worst-case objective recorded for failed or timed-out runs.
    pub penalty_objective: f64,
    pub n_trials: usize,
    pub min_samples: usize,
    pub max_samples: usize,
    /// Target 95% CI half-width on a candidate's mean, relative to |mean|.
    pub precision_target: f64,
    /// Per-test significance level. Raw p-values are reported regardless, so
    /// stricter post-hoc thresholds remain possible.
    pub alpha: f64,
    /// Dismiss candidates whose running mean falls past the baseline-derived
    /// knockout bound as soon as `min_samples` are in hand.
    pub use_knockout: bool,
    /// Ablate the best significant configuration after the run.
    pub refine: bool,
    /// How often an invalid proposal is re-requested before the trial is
    /// skipped.
    pub max_proposal_retries: usize,
}

impl TuneOptions {
    pub fn new(
        instances: Vec<InstanceId>,
        time_limit_secs: f64,
        direction: ObjectiveDirection,
    ) -> Self {
        Self {
            instances,
            time_limit_secs,
            direction,
            penalty_objective: time_limit_secs * 10.0,
            n_trials: 100,
            min_samples: 10,
            max_samples: 30,
            precision_target: 0.1,
            alpha: DEFAULT_ALPHA,
            use_knockout: true,
            refine: false,
            max_proposal_retries: 10,
        }
    }

    pub fn with_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_sample_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_samples = min;
        self.max_samples = max;
        self
    }

    pub fn with_precision_target(mut self, target: f64) -> Self {
        self.precision_target = target;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_penalty_objective(mut self, penalty: f64) -> Self {
        self.penalty_objective = penalty;
        self
    }

    pub fn with_knockout(mut self, enabled: bool) -> Self {
        self.use_knockout = enabled;
        self
    }

    pub fn with_refine(mut self, enabled: bool) -> Self {
        self.refine = enabled;
        self
    }

    pub fn validate(&self) -> TuneResult<()> {
        if self.instances.is_empty() {
            return Err(TuneError::InvalidOptions {
                message: "at least one problem instance is required".to_string(),
            });
        }
        if self.time_limit_secs <= 0.0 {
            return Err(TuneError::InvalidOptions {
                message: "time limit must be positive".to_string(),
            });
        }
        if self.min_samples == 0 || self.min_samples > self.max_samples {
            return Err(TuneError::InvalidOptions {
                message: format!(
                    "sample bounds must satisfy 1 <= min <= max, got [{}, {}]",
                    self.min_samples, self.max_samples
                ),
            });
        }
        if self.precision_target < 0.0 {
            return Err(TuneError::InvalidOptions {
                message: "precision target must be non-negative".to_string(),
            });
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(TuneError::InvalidOptions {
                message: "alpha must lie in (0, 1)".to_string(),
            });
        }
        Ok(())
    }

    fn sampler_settings(&self, knockout: Option<f64>) -> SamplerSettings {
        SamplerSettings {
            min_samples: self.min_samples,
            max_samples: self.max_samples,
            precision_target: self.precision_target,
            knockout,
            direction: self.direction,
            time_limit_secs: self.time_limit_secs,
            penalty_objective: self.penalty_objective,
        }
    }
}

// ---------------------------------------------------------------------------
// Trial records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Completed,
    Failed,
}

/// One proposed-configuration/evaluate/score cycle, frozen after recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: Uuid,
    pub trial_index: usize,
    pub configuration: Configuration,
    pub distribution: Option<SampleDistribution>,
    /// Scored against the run's single frozen baseline.
    pub comparison: Option<Comparison>,
    pub status: TrialStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TrialRecord {
    pub fn new(trial_index: usize, configuration: Configuration) -> Self {
        Self {
            id: Uuid::new_v4(),
            trial_index,
            configuration,
            distribution: None,
            comparison: None,
            status: TrialStatus::Failed,
            created_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_completed(&mut self, distribution: SampleDistribution, comparison: Comparison) {
        self.distribution = Some(distribution);
        self.comparison = Some(comparison);
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

// ---------------------------------------------------------------------------
// Tuner
// ---------------------------------------------------------------------------

enum Proposal {
    Candidate(Configuration),
    /// All retries produced domain-violating configurations.
    Skipped(String),
    /// The suggester has no further candidates.
    Exhausted,
}

fn next_valid_proposal<S: Suggester>(
    suggester: &mut S,
    space: &ParameterSpace,
    max_retries: usize,
) -> Proposal {
    let mut last_error = String::new();
    for _ in 0..=max_retries {
        match suggester.propose() {
            None => return Proposal::Exhausted,
            Some(config) => match space.validate(&config) {
                Ok(()) => return Proposal::Candidate(config),
                Err(e) => {
                    warn!("Rejected proposal {config}: {e}; re-requesting");
                    last_error = e.to_string();
                }
            },
        }
    }
    Proposal::Skipped(last_error)
}

/// Drives a tuning run over a fixed trial budget.
///
/// The trial loop is strictly sequential: the suggester must observe each
/// trial's reward before proposing the next. No state crosses trials except
/// the frozen baseline, the suggester's own search state, and the sampler's
/// evaluation cache.
pub struct Tuner<R: MeasurementSource, S: Suggester> {
    space: ParameterSpace,
    runner: R,
    suggester: S,
    options: TuneOptions,
}

impl<R: MeasurementSource, S: Suggester> Tuner<R, S> {
    pub fn new(space: ParameterSpace, runner: R, suggester: S, options: TuneOptions) -> Self {
        Self {
            space,
            runner,
            suggester,
            options,
        }
    }

    /// Run the full tuning loop and aggregate the outcome.
    ///
    /// Ordinary per-trial problems (failed measurements, insufficient data,
    /// invalid proposals) never abort the run; only an unmeasurable default
    /// configuration does.
    pub fn run(&mut self) -> TuneResult<TuneOutcome> {
        self.options.validate()?;
        self.space.check()?;

        let run_id = Uuid::new_v4();
        info!(
            "Starting tuning run {run_id}: {} trials, strategy '{}', {} instances",
            self.options.n_trials,
            self.suggester.name(),
            self.options.instances.len()
        );

        let default_config = self.space.default_configuration();
        let baseline_settings = self.options.sampler_settings(None);
        let baseline = baseline::estimate(
            &self.runner,
            &self.options.instances,
            &default_config,
            &baseline_settings,
        )?;

        let knockout = self
            .options
            .use_knockout
            .then(|| baseline.knockout_bound(self.options.direction));
        let settings = self.options.sampler_settings(knockout);
        let mut sampler = AdaptiveSampler::new(&self.runner, &self.options.instances);

        let mut records: Vec<TrialRecord> = Vec::new();
        let mut trials_failed = 0usize;

        for trial_index in 0..self.options.n_trials {
            let config = match next_valid_proposal(
                &mut self.suggester,
                &self.space,
                self.options.max_proposal_retries,
            ) {
                Proposal::Candidate(config) => config,
                Proposal::Skipped(error) => {
                    warn!("Trial {trial_index} skipped: no valid proposal ({error})");
                    trials_failed += 1;
                    continue;
                }
                Proposal::Exhausted => {
                    info!("Suggester exhausted after {trial_index} trials");
                    break;
                }
            };

            let mut record = TrialRecord::new(trial_index, config.clone());
            match sampler.evaluate(&config, &settings) {
                Ok(distribution) => {
                    let comparison = significance::compare(
                        &distribution,
                        baseline.distribution(),
                        self.options.alpha,
                    );
                    let reward = self.options.direction.orient(comparison.effect_size);
                    info!(
                        "Trial {trial_index}: {} samples, effect {:+.3}, p={:.4}, significant={}",
                        distribution.len(),
                        comparison.effect_size,
                        comparison.p_value,
                        comparison.significant
                    );
                    self.suggester.observe(&config, reward);
                    record.mark_completed(distribution, comparison);
                }
                Err(TuneError::InsufficientData {
                    valid, required, ..
                }) => {
                    warn!(
                        "Trial {trial_index} failed: {valid}/{required} valid measurements for {config}"
                    );
                    // Steer the suggester away with the worst-case reward.
                    let reward = self
                        .options
                        .direction
                        .orient(self.options.penalty_objective - baseline.mean());
                    self.suggester.observe(&config, reward);
                    record.mark_failed(format!(
                        "insufficient data: {valid}/{required} valid measurements"
                    ));
                    trials_failed += 1;
                }
                Err(e) => return Err(e),
            }
            records.push(record);
        }

        let recommendations = report::select(&records, self.options.direction);
        let trials_completed = records
            .iter()
            .filter(|r| r.status == TrialStatus::Completed)
            .count();
        info!(
            "Tuning run {run_id} finished: {trials_completed} completed, {trials_failed} failed, \
             {} recommendations",
            recommendations.len()
        );

        let refined = if self.options.refine {
            match recommendations.first() {
                Some(best) => {
                    // Measure refinement variants on their own merits.
                    let refine_settings = self.options.sampler_settings(None);
                    match ablation::refine(
                        &best.configuration,
                        &self.space,
                        &mut sampler,
                        &refine_settings,
                    ) {
                        Ok(result) => Some(result),
                        Err(e) => {
                            warn!("Refinement failed, keeping the unrefined best: {e}");
                            None
                        }
                    }
                }
                None => None,
            }
        } else {
            None
        };

        Ok(TuneOutcome {
            run_id,
            direction: self.options.direction,
            baseline: baseline.summary(),
            recommendations,
            refined,
            trials_completed,
            trials_failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggest::RandomSuggester;
    use cb_types::{Measurement, RunStatus};

    fn options() -> TuneOptions {
        TuneOptions::new(
            vec![InstanceId::from("inst-0")],
            60.0,
            ObjectiveDirection::Minimize,
        )
        .with_trials(5)
        .with_sample_bounds(5, 10)
    }

    #[test]
    fn options_validation_rejects_bad_inputs() {
        let no_instances = TuneOptions::new(vec![], 60.0, ObjectiveDirection::Minimize);
        assert!(no_instances.validate().is_err());

        let bad_bounds = options().with_sample_bounds(10, 5);
        assert!(bad_bounds.validate().is_err());

        let bad_alpha = options().with_alpha(1.5);
        assert!(bad_alpha.validate().is_err());

        let bad_limit = TuneOptions::new(
            vec![InstanceId::from("i")],
            0.0,
            ObjectiveDirection::Minimize,
        );
        assert!(bad_limit.validate().is_err());
    }

    #[test]
    fn default_penalty_is_par10() {
        let opts = TuneOptions::new(
            vec![InstanceId::from("i")],
            60.0,
            ObjectiveDirection::Minimize,
        );
        assert_eq!(opts.penalty_objective, 600.0);
    }

    #[test]
    fn trial_record_lifecycle() {
        let mut record = TrialRecord::new(3, Configuration::new());
        assert_eq!(record.status, TrialStatus::Failed);
        assert!(record.finished_at.is_none());

        record.mark_failed("no data".to_string());
        assert_eq!(record.status, TrialStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("no data"));
        assert!(record.finished_at.is_some());

        let mut completed = TrialRecord::new(4, Configuration::new());
        completed.mark_completed(
            SampleDistribution::new(),
            Comparison {
                effect_size: -1.0,
                p_value: 0.01,
                significant: true,
                candidate_mean: 9.0,
                baseline_mean: 10.0,
            },
        );
        assert_eq!(completed.status, TrialStatus::Completed);
        assert!(completed.comparison.is_some());
    }

    #[test]
    fn flat_objective_yields_no_recommendations() {
        // Every configuration performs identically: nothing can be certified.
        let runner = |_: &Configuration, _: &InstanceId, _: f64| {
            Ok(Measurement::new(10.0, RunStatus::Optimal))
        };
        let space = ParameterSpace::new().add_bool("x", false).add_int("y", 0, 5, 2);
        let suggester = RandomSuggester::new(space.clone());
        let mut tuner = Tuner::new(space, runner, suggester, options());

        let outcome = tuner.run().unwrap();
        assert!(outcome.recommendations.is_empty());
        assert_eq!(outcome.trials_completed, 5);
        assert_eq!(outcome.trials_failed, 0);
        assert_eq!(outcome.baseline.mean, 10.0);
    }

    #[test]
    fn baseline_failure_aborts_the_run() {
        let runner = |_: &Configuration, _: &InstanceId, _: f64| {
            Err(TuneError::Measurement {
                message: "infeasible".to_string(),
            })
        };
        let space = ParameterSpace::new().add_bool("x", false);
        let suggester = RandomSuggester::new(space.clone());
        let mut tuner = Tuner::new(space, runner, suggester, options());
        assert!(matches!(tuner.run(), Err(TuneError::Baseline { .. })));
    }

    #[test]
    fn invalid_space_aborts_before_any_measurement() {
        let runner = |_: &Configuration, _: &InstanceId, _: f64| {
            Ok(Measurement::new(1.0, RunStatus::Optimal))
        };
        let space = ParameterSpace::new().add_int("x", 0, 5, 99);
        let suggester = RandomSuggester::new(space.clone());
        let mut tuner = Tuner::new(space, runner, suggester, options());
        assert!(matches!(tuner.run(), Err(TuneError::Space(_))));
    }
}
