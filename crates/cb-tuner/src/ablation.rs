//! Post-run refinement: which of the winning parameter changes are essential?
//!
//! Tuned configurations tend to carry along incidental parameter changes that
//! contributed nothing. Resetting each changed parameter to its default, one
//! at a time, and re-measuring separates the essential changes from the
//! freeloaders, and yields a contribution share per surviving parameter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cb_types::{Configuration, ObjectiveDirection, ParameterSpace, TuneResult};

use crate::runner::MeasurementSource;
use crate::sampler::{AdaptiveSampler, SamplerSettings};

/// The reduced configuration plus each kept parameter's share of the
/// observed improvement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedResult {
    pub configuration: Configuration,
    /// Per-parameter share of the total degradation observed when resetting
    /// it to default; sums to 1 over the kept parameters. Empty when nothing
    /// could be attributed (or the reduction had to be reverted).
    pub contribution: BTreeMap<String, f64>,
    /// Mean objective of the refined configuration.
    pub score: f64,
}

/// Refine a winning configuration by one-parameter-at-a-time ablation.
///
/// A parameter is dropped when the configuration without it performs no
/// worse than a conservative acceptance bound halfway between the reference
/// mean and its worst observation; comparing against the worst stays biased
/// toward solver defaults, which are far better tested. If the fully
/// reduced configuration then regresses against the reference, the original
/// is returned unchanged (correlated parameters resist marginal analysis).
pub fn refine<R: MeasurementSource>(
    best: &Configuration,
    space: &ParameterSpace,
    sampler: &mut AdaptiveSampler<'_, R>,
    settings: &SamplerSettings,
) -> TuneResult<RefinedResult> {
    let changed = best.overrides(space);
    let reference = sampler.evaluate(best, settings)?;
    let reference_mean = reference.mean();

    if changed.is_empty() {
        return Ok(RefinedResult {
            configuration: best.clone(),
            contribution: BTreeMap::new(),
            score: reference_mean,
        });
    }

    let direction = settings.direction;
    let worst = match direction {
        ObjectiveDirection::Minimize => reference.max(),
        ObjectiveDirection::Maximize => reference.min(),
    };
    let accept_as_equal = (worst + reference_mean) / 2.0;
    info!(
        "Checking which of {} parameter changes are essential (reference mean {:.3})",
        changed.len(),
        reference_mean
    );

    let mut refined = best.clone();
    let mut degradation: BTreeMap<String, f64> = BTreeMap::new();

    for (name, _) in changed.iter() {
        let variant = best.without(name);
        let score = sampler.evaluate(&variant, settings)?.mean();
        if direction.is_better(accept_as_equal, score) {
            debug!("Parameter '{name}' is essential ({score:.3} without it)");
            degradation.insert(name.clone(), (reference_mean - score).abs());
        } else {
            info!("Parameter '{name}' can revert to default ({score:.3} without it)");
            refined = refined.without(name);
        }
    }

    let total: f64 = degradation.values().sum();
    let contribution = if total > 0.0 {
        degradation
            .iter()
            .map(|(name, diff)| (name.clone(), diff / total))
            .collect()
    } else {
        BTreeMap::new()
    };

    let final_distribution = sampler.evaluate(&refined, settings)?;
    let final_best = match direction {
        ObjectiveDirection::Minimize => final_distribution.min(),
        ObjectiveDirection::Maximize => final_distribution.max(),
    };
    if direction.is_better(worst, final_best) {
        // Even the reference's worst run beats the reduced configuration's
        // best: the dropped parameters were load-bearing in combination.
        warn!("Reduced configuration regressed; reverting to the full configuration");
        return Ok(RefinedResult {
            configuration: best.clone(),
            contribution: BTreeMap::new(),
            score: reference_mean,
        });
    }

    Ok(RefinedResult {
        configuration: refined,
        contribution,
        score: final_distribution.mean(),
    })
}
