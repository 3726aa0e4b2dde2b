//! Candidate-proposing strategies behind the suggester seam.
//!
//! The engine owns the timing of calls; a suggester owns its search state.
//! Any sequential-decision strategy (random search, Bayesian optimization,
//! bandits) can sit behind the same propose/observe contract.

use rand::Rng;

use cb_types::{Configuration, ParamKind, ParamValue, ParameterSpace};

/// Sequential proposer of candidate configurations.
pub trait Suggester {
    /// Next candidate, or `None` once the strategy is exhausted.
    fn propose(&mut self) -> Option<Configuration>;

    /// Objective feedback for a proposed configuration. `reward` is oriented
    /// so that larger is always better, regardless of tuning direction.
    fn observe(&mut self, config: &Configuration, reward: f64);

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Reset any knob whose dependency does not hold back to its default, so
/// sampled configurations always validate. Chained dependencies settle in at
/// most `specs.len()` passes.
fn repair_dependencies(space: &ParameterSpace, config: &mut Configuration) {
    for _ in 0..space.len() {
        let mut changed = false;
        for spec in &space.specs {
            let Some(dep) = &spec.requires else { continue };
            let holds = space
                .effective_value(config, &dep.parameter)
                .map(|v| v == dep.value)
                .unwrap_or(false);
            if !holds && config.get(&spec.name) != Some(&spec.default) {
                config.set(&spec.name, spec.default.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

fn sample_value(kind: &ParamKind, rng: &mut impl Rng) -> ParamValue {
    match kind {
        ParamKind::Bool => ParamValue::Bool(rng.random::<bool>()),
        ParamKind::IntRange { low, high } => ParamValue::Int(rng.random_range(*low..=*high)),
        ParamKind::FloatRange { low, high } => ParamValue::Float(rng.random_range(*low..=*high)),
        ParamKind::Categorical { values } => values[rng.random_range(0..values.len())].clone(),
    }
}

// ---- Random search ----

/// Independent uniform sampling across the space.
///
/// The first proposal is always the all-default configuration, warm-starting
/// the run with the one configuration known to be sane.
#[derive(Debug, Clone)]
pub struct RandomSuggester {
    space: ParameterSpace,
    proposed_default: bool,
}

impl RandomSuggester {
    pub fn new(space: ParameterSpace) -> Self {
        Self {
            space,
            proposed_default: false,
        }
    }

    fn sample_one(&self) -> Configuration {
        let mut rng = rand::rng();
        let mut config = Configuration::new();
        for spec in &self.space.specs {
            config.set(&spec.name, sample_value(&spec.kind, &mut rng));
        }
        for (name, value) in self.space.fixed_parameters() {
            config.set(name, value.clone());
        }
        repair_dependencies(&self.space, &mut config);
        config
    }
}

impl Suggester for RandomSuggester {
    fn propose(&mut self) -> Option<Configuration> {
        if !self.proposed_default {
            self.proposed_default = true;
            return Some(self.space.default_configuration());
        }
        Some(self.sample_one())
    }

    fn observe(&mut self, _config: &Configuration, _reward: f64) {}

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Annealing search ----

/// Explore/exploit strategy: with probability `exploration_weight` sample
/// uniformly, otherwise perturb the best-rewarded configuration seen so far.
#[derive(Debug, Clone)]
pub struct AnnealingSuggester {
    space: ParameterSpace,
    exploration_weight: f64,
    observations: Vec<(Configuration, f64)>,
    proposed_default: bool,
}

impl AnnealingSuggester {
    pub fn new(space: ParameterSpace, exploration_weight: f64) -> Self {
        Self {
            space,
            exploration_weight: exploration_weight.clamp(0.0, 1.0),
            observations: Vec::new(),
            proposed_default: false,
        }
    }

    fn explore(&self) -> Configuration {
        RandomSuggester::new(self.space.clone()).sample_one()
    }

    /// Perturb the best-known configuration: small integer steps, ±10% of the
    /// range for floats, occasional flips for booleans and categories.
    fn exploit(&self) -> Configuration {
        let best = self
            .observations
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let base = match best {
            Some((config, _)) => config.clone(),
            None => return self.explore(),
        };

        let mut rng = rand::rng();
        let mut perturbed = Configuration::new();

        for spec in &self.space.specs {
            let base_val = base.get(&spec.name);
            let value = match (&spec.kind, base_val) {
                (ParamKind::Bool, Some(ParamValue::Bool(v))) => {
                    ParamValue::Bool(if rng.random::<f64>() < 0.2 { !v } else { *v })
                }
                (ParamKind::IntRange { low, high }, Some(ParamValue::Int(v))) => {
                    let delta: i64 = rng.random_range(-2..=2);
                    ParamValue::Int((v + delta).clamp(*low, *high))
                }
                (ParamKind::FloatRange { low, high }, Some(ParamValue::Float(v))) => {
                    let noise = rng.random_range(-0.1..0.1) * (high - low);
                    ParamValue::Float((v + noise).clamp(*low, *high))
                }
                (ParamKind::Categorical { values }, Some(v)) => {
                    if rng.random::<f64>() < 0.2 {
                        values[rng.random_range(0..values.len())].clone()
                    } else {
                        v.clone()
                    }
                }
                // Missing or mismatched base value: fall back to a fresh draw.
                (kind, _) => sample_value(kind, &mut rng),
            };
            perturbed.set(&spec.name, value);
        }
        for (name, value) in self.space.fixed_parameters() {
            perturbed.set(name, value.clone());
        }
        repair_dependencies(&self.space, &mut perturbed);
        perturbed
    }
}

impl Suggester for AnnealingSuggester {
    fn propose(&mut self) -> Option<Configuration> {
        if !self.proposed_default {
            self.proposed_default = true;
            return Some(self.space.default_configuration());
        }
        let mut rng = rand::rng();
        if self.observations.is_empty() || rng.random::<f64>() < self.exploration_weight {
            Some(self.explore())
        } else {
            Some(self.exploit())
        }
    }

    fn observe(&mut self, config: &Configuration, reward: f64) {
        self.observations.push((config.clone(), reward));
    }

    fn name(&self) -> &str {
        "annealing"
    }
}
