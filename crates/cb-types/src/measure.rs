//! Measurements, sample distributions, and the baseline reference.

use serde::{Deserialize, Serialize};

/// Terminal status of a single solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Proved optimal (or within the configured gap) before the time limit.
    Optimal,
    /// Found a feasible solution but did not prove optimality.
    Feasible,
    /// Hit the time limit without the required solution.
    Timeout,
    /// The instance is infeasible under this configuration.
    Infeasible,
}

/// One noisy observation of solver performance for a fixed configuration
/// and instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Scalar objective: time-to-optimal in seconds, or achieved solution
    /// quality, depending on the tuning goal. Timeouts carry the caller's
    /// penalty value rather than being dropped.
    pub objective: f64,
    pub status: RunStatus,
}

impl Measurement {
    pub fn new(objective: f64, status: RunStatus) -> Self {
        Self { objective, status }
    }
}

/// Whether lower or higher objective values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    Minimize,
    Maximize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Minimize
    }
}

impl ObjectiveDirection {
    /// Map a signed effect (candidate − baseline) onto a reward where larger
    /// is always better.
    pub fn orient(&self, effect: f64) -> f64 {
        match self {
            Self::Minimize => -effect,
            Self::Maximize => effect,
        }
    }

    /// Whether `a` is strictly better than `b` under this direction.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        match self {
            Self::Minimize => a < b,
            Self::Maximize => a > b,
        }
    }
}

// ---------------------------------------------------------------------------
// Sample distributions
// ---------------------------------------------------------------------------

/// The ordered measurements collected for one configuration.
///
/// Append-only: the adaptive sampler is the sole writer; once the stopping
/// rule fires the distribution is frozen and handed to the significance
/// tester. Failed runs enter as penalty measurements, never dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleDistribution {
    measurements: Vec<Measurement>,
}

impl SampleDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn objectives(&self) -> impl Iterator<Item = f64> + '_ {
        self.measurements.iter().map(|m| m.objective)
    }

    pub fn mean(&self) -> f64 {
        if self.measurements.is_empty() {
            return 0.0;
        }
        self.objectives().sum::<f64>() / self.measurements.len() as f64
    }

    /// Unbiased sample variance (divides by n-1); 0.0 below 2 samples.
    pub fn variance(&self) -> f64 {
        let n = self.measurements.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq: f64 = self.objectives().map(|x| (x - mean) * (x - mean)).sum();
        sum_sq / (n as f64 - 1.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.objectives().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.objectives().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn spread(&self) -> f64 {
        if self.measurements.is_empty() {
            return 0.0;
        }
        self.max() - self.min()
    }

    /// Half-width of the 95% normal confidence interval on the mean.
    ///
    /// Infinite below 2 samples: a single observation carries no precision
    /// estimate, so the sampler must keep drawing.
    pub fn half_width_95(&self) -> f64 {
        let n = self.measurements.len();
        if n < 2 {
            return f64::INFINITY;
        }
        1.96 * self.std_dev() / (n as f64).sqrt()
    }

    pub fn timeout_count(&self) -> usize {
        self.measurements
            .iter()
            .filter(|m| m.status == RunStatus::Timeout)
            .count()
    }

    pub fn status_count(&self, status: RunStatus) -> usize {
        self.measurements
            .iter()
            .filter(|m| m.status == status)
            .count()
    }

    pub fn summary(&self) -> DistributionSummary {
        DistributionSummary {
            count: self.len(),
            mean: self.mean(),
            std_dev: self.std_dev(),
            min: if self.is_empty() { 0.0 } else { self.min() },
            max: if self.is_empty() { 0.0 } else { self.max() },
            timeouts: self.timeout_count(),
        }
    }
}

/// Display-ready statistics for one sample distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub timeouts: usize,
}

// ---------------------------------------------------------------------------
// Baseline
// ---------------------------------------------------------------------------

/// The default configuration's distribution, tagged as the reference.
///
/// Created exactly once per tuning run and read-only thereafter; every
/// significance test in the run compares against this same frozen value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    distribution: SampleDistribution,
}

impl Baseline {
    pub fn new(distribution: SampleDistribution) -> Self {
        Self { distribution }
    }

    pub fn distribution(&self) -> &SampleDistribution {
        &self.distribution
    }

    pub fn mean(&self) -> f64 {
        self.distribution.mean()
    }

    pub fn summary(&self) -> DistributionSummary {
        self.distribution.summary()
    }

    /// Knockout bound for cheap dismissal: the baseline's worst observation
    /// pushed out by 10% of its spread. A candidate whose running mean is
    /// past this bound cannot plausibly beat the baseline.
    pub fn knockout_bound(&self, direction: ObjectiveDirection) -> f64 {
        let margin = 0.1 * self.distribution.spread();
        match direction {
            ObjectiveDirection::Minimize => self.distribution.max() + margin,
            ObjectiveDirection::Maximize => self.distribution.min() - margin,
        }
    }
}
