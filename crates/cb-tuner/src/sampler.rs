//! Adaptive per-configuration sampling with a running-precision stopping rule.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use cb_types::{
    Configuration, Measurement, ObjectiveDirection, RunStatus, SampleDistribution, TuneError,
    TuneResult,
};

use crate::runner::{InstanceId, MeasurementSource};

/// Stopping-rule and recovery settings for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub min_samples: usize,
    pub max_samples: usize,
    /// Target 95% CI half-width on the mean, relative to |mean| (absolute
    /// when the mean is within machine epsilon of zero).
    pub precision_target: f64,
    /// Objective bound past which a candidate is dismissed early. Derived
    /// from the baseline; `None` disables knockout.
    pub knockout: Option<f64>,
    pub direction: ObjectiveDirection,
    pub time_limit_secs: f64,
    /// Worst-case objective substituted for recovered measurement failures.
    pub penalty_objective: f64,
}

impl SamplerSettings {
    fn precision_reached(&self, distribution: &SampleDistribution) -> bool {
        let half_width = distribution.half_width_95();
        let mean = distribution.mean().abs();
        let target = if mean > f64::EPSILON {
            self.precision_target * mean
        } else {
            self.precision_target
        };
        half_width <= target
    }

    fn knocked_out(&self, distribution: &SampleDistribution) -> bool {
        match self.knockout {
            // The running mean already sits past the bound: clearly worse.
            Some(bound) => self.direction.is_better(bound, distribution.mean()),
            None => false,
        }
    }
}

/// Draws measurements for one configuration at a time until its mean is
/// estimated precisely enough, bounded by `[min_samples, max_samples]`.
///
/// A single measurement is unreliable (randomized search inside the solver),
/// but sampling every candidate to the maximum wastes the budget; adaptive
/// stopping concentrates effort on ambiguous candidates and dismisses
/// clear-cut ones cheaply. Completed distributions are cached by canonical
/// configuration key, so a re-proposed configuration extends its existing
/// samples instead of starting over.
pub struct AdaptiveSampler<'a, R: MeasurementSource> {
    runner: &'a R,
    instances: &'a [InstanceId],
    cache: HashMap<String, SampleDistribution>,
}

impl<'a, R: MeasurementSource> AdaptiveSampler<'a, R> {
    pub fn new(runner: &'a R, instances: &'a [InstanceId]) -> Self {
        Self {
            runner,
            instances,
            cache: HashMap::new(),
        }
    }

    fn instance_for(&self, draw: usize) -> &InstanceId {
        // Round-robin so every distribution covers all instances identically.
        &self.instances[draw % self.instances.len()]
    }

    /// One recovered draw: a runner error becomes a worst-case penalty
    /// measurement rather than aborting the evaluation. Returns whether the
    /// measurement counts as valid.
    fn recover(
        &self,
        config: &Configuration,
        result: TuneResult<Measurement>,
        distribution: &mut SampleDistribution,
        settings: &SamplerSettings,
    ) -> bool {
        match result {
            Ok(measurement) => {
                distribution.push(measurement);
                true
            }
            Err(e) => {
                warn!("Measurement failed for {config}: {e}; recording worst-case penalty");
                distribution.push(Measurement::new(settings.penalty_objective, RunStatus::Timeout));
                false
            }
        }
    }

    /// Evaluate one configuration, returning its frozen sample distribution.
    ///
    /// The distribution size always lands within `[min_samples, max_samples]`
    /// (counting recovered failures); the only error path is failing to
    /// gather `min_samples` valid measurements within the attempt budget.
    pub fn evaluate(
        &mut self,
        config: &Configuration,
        settings: &SamplerSettings,
    ) -> TuneResult<SampleDistribution> {
        if self.instances.is_empty() {
            return Err(TuneError::InvalidOptions {
                message: "at least one problem instance is required".to_string(),
            });
        }

        let key = config.cache_key();
        let mut distribution = self.cache.get(&key).cloned().unwrap_or_default();
        let cached = distribution.len();
        if cached > 0 {
            debug!("Reusing {cached} cached measurements for {config}");
        }
        let mut valid = cached;

        // Initial batch up to min_samples, dispatched across worker threads:
        // the solver run is the expensive blocking call, and the measurements
        // are independent given the configuration.
        let missing = settings.min_samples.saturating_sub(distribution.len());
        if missing > 0 {
            let results: Vec<TuneResult<Measurement>> = (0..missing)
                .into_par_iter()
                .map(|i| {
                    self.runner
                        .run(config, self.instance_for(cached + i), settings.time_limit_secs)
                })
                .collect();
            for result in results {
                if self.recover(config, result, &mut distribution, settings) {
                    valid += 1;
                }
            }
        }

        // Adaptive tail: one draw at a time until the stopping rule fires.
        loop {
            if valid >= settings.min_samples {
                if settings.knocked_out(&distribution) {
                    debug!(
                        "Knocked out {config} after {} samples (mean {:.3})",
                        distribution.len(),
                        distribution.mean()
                    );
                    break;
                }
                if settings.precision_reached(&distribution) {
                    break;
                }
            }
            if distribution.len() >= settings.max_samples {
                break;
            }
            let draw = distribution.len();
            let result = self
                .runner
                .run(config, self.instance_for(draw), settings.time_limit_secs);
            if self.recover(config, result, &mut distribution, settings) {
                valid += 1;
            }
        }

        if valid < settings.min_samples {
            return Err(TuneError::InsufficientData {
                config: config.to_string(),
                valid,
                required: settings.min_samples,
            });
        }

        self.cache.insert(key, distribution.clone());
        Ok(distribution)
    }
}
