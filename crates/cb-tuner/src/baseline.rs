//! Baseline estimation: the reference every candidate is judged against.

use rayon::prelude::*;
use tracing::{info, warn};

use cb_types::{
    Baseline, Configuration, Measurement, RunStatus, SampleDistribution, TuneError, TuneResult,
};

use crate::runner::{InstanceId, MeasurementSource};
use crate::sampler::SamplerSettings;

/// Measure the default configuration at the full `max_samples` budget.
///
/// The baseline is sampled to the maximum, with no adaptive stopping and no
/// knockout: its precision gates every later significance test, and an
/// imprecise baseline inflates both false positives and false negatives
/// downstream. Failing to obtain `min_samples` valid measurements is fatal
/// since tuning cannot proceed without a reference.
pub fn estimate<R: MeasurementSource>(
    runner: &R,
    instances: &[InstanceId],
    default_config: &Configuration,
    settings: &SamplerSettings,
) -> TuneResult<Baseline> {
    if instances.is_empty() {
        return Err(TuneError::Baseline {
            message: "at least one problem instance is required".to_string(),
        });
    }

    info!(
        "Estimating baseline over {} measurements of the default configuration",
        settings.max_samples
    );

    let results: Vec<TuneResult<Measurement>> = (0..settings.max_samples)
        .into_par_iter()
        .map(|i| {
            runner.run(
                default_config,
                &instances[i % instances.len()],
                settings.time_limit_secs,
            )
        })
        .collect();

    let mut distribution = SampleDistribution::new();
    let mut valid = 0usize;
    for result in results {
        match result {
            Ok(measurement) => {
                distribution.push(measurement);
                valid += 1;
            }
            Err(e) => {
                warn!("Baseline measurement failed: {e}; recording worst-case penalty");
                distribution.push(Measurement::new(settings.penalty_objective, RunStatus::Timeout));
            }
        }
    }

    if valid < settings.min_samples {
        return Err(TuneError::Baseline {
            message: format!(
                "only {valid} of {} baseline measurements succeeded ({} required)",
                settings.max_samples, settings.min_samples
            ),
        });
    }

    info!(
        "Baseline evaluation completed: min={:.3}, mean={:.3}, max={:.3}",
        distribution.min(),
        distribution.mean(),
        distribution.max()
    );

    Ok(Baseline::new(distribution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_types::ObjectiveDirection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings() -> SamplerSettings {
        SamplerSettings {
            min_samples: 5,
            max_samples: 20,
            precision_target: 0.1,
            knockout: None,
            direction: ObjectiveDirection::Minimize,
            time_limit_secs: 60.0,
            penalty_objective: 600.0,
        }
    }

    fn instances() -> Vec<InstanceId> {
        vec![InstanceId::from("inst-0")]
    }

    #[test]
    fn baseline_uses_the_full_budget() {
        // Zero variance would stop an adaptive evaluation at min_samples;
        // the baseline must still take all max_samples.
        let runner =
            |_: &Configuration, _: &InstanceId, _: f64| Ok(Measurement::new(10.0, RunStatus::Optimal));
        let inst = instances();
        let baseline = estimate(&runner, &inst, &Configuration::new(), &settings()).unwrap();
        assert_eq!(baseline.distribution().len(), 20);
        assert_eq!(baseline.mean(), 10.0);
    }

    #[test]
    fn sporadic_failures_are_recovered() {
        let counter = AtomicUsize::new(0);
        let runner = move |_: &Configuration, _: &InstanceId, _: f64| {
            let i = counter.fetch_add(1, Ordering::SeqCst);
            if i % 7 == 3 {
                Err(TuneError::Measurement {
                    message: "spurious crash".to_string(),
                })
            } else {
                Ok(Measurement::new(9.0, RunStatus::Optimal))
            }
        };
        let inst = instances();
        let baseline = estimate(&runner, &inst, &Configuration::new(), &settings()).unwrap();
        assert_eq!(baseline.distribution().len(), 20);
        assert!(baseline.distribution().timeout_count() > 0);
    }

    #[test]
    fn unmeasurable_default_configuration_is_fatal() {
        let runner = |_: &Configuration, _: &InstanceId, _: f64| {
            Err(TuneError::Measurement {
                message: "instance always infeasible".to_string(),
            })
        };
        let inst = instances();
        match estimate(&runner, &inst, &Configuration::new(), &settings()) {
            Err(TuneError::Baseline { message }) => {
                assert!(message.contains("0 of 20"));
            }
            other => panic!("expected fatal baseline error, got {other:?}"),
        }
    }
}
