//! The measurement-source seam: one solver execution per call.

use serde::{Deserialize, Serialize};

use cb_types::{Configuration, Measurement, TuneResult};

/// Opaque handle for a problem instance. Loading and owning instances is the
/// caller's concern; the engine only routes the handle back to the runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Executes the solver once for one configuration, one instance, one time
/// budget, returning a single noisy measurement.
///
/// The output is stochastic (randomized search inside the solver) but the
/// call must return within the time limit plus bounded overhead. `Sync`
/// because measurements for one configuration may be dispatched across
/// worker threads.
pub trait MeasurementSource: Sync {
    fn run(
        &self,
        config: &Configuration,
        instance: &InstanceId,
        time_limit_secs: f64,
    ) -> TuneResult<Measurement>;
}

/// Closure adapter, mainly for tests and lightweight embedders.
impl<F> MeasurementSource for F
where
    F: Fn(&Configuration, &InstanceId, f64) -> TuneResult<Measurement> + Sync,
{
    fn run(
        &self,
        config: &Configuration,
        instance: &InstanceId,
        time_limit_secs: f64,
    ) -> TuneResult<Measurement> {
        self(config, instance, time_limit_secs)
    }
}
