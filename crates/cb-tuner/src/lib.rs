//! # cb-tuner
//!
//! Adaptive evaluation and significance testing for Calibra.
//!
//! Drives the tuning loop: estimate a baseline for the default configuration,
//! let a suggester propose candidates, sample each one adaptively until its
//! mean is precise enough (or it is knocked out), rank-test it against the
//! baseline, and aggregate the statistically certified improvements into
//! ranked recommendations. Optionally refines the winner by per-parameter
//! ablation.

mod ablation;
mod baseline;
mod orchestrator;
mod report;
mod runner;
mod sampler;
mod significance;
mod suggest;

pub use ablation::{refine, RefinedResult};
pub use baseline::estimate as estimate_baseline;
pub use orchestrator::{TrialRecord, TrialStatus, TuneOptions, Tuner};
pub use report::{select, select_with_alpha, Recommendation, TuneOutcome};
pub use runner::{InstanceId, MeasurementSource};
pub use sampler::{AdaptiveSampler, SamplerSettings};
pub use significance::{compare, Comparison, DEFAULT_ALPHA};
pub use suggest::{AnnealingSuggester, RandomSuggester, Suggester};
