//! # rt-optimizer
//!
//! Hyperparameter search for reinforcement-learning trainers.
//!
//! Provides the structured search space and sampler, random and TPE search
//! strategies, median pruning, the per-trial training runner and the study
//! controller that runs trials on a worker pool and reports the results.

mod analysis;
mod pruner;
mod report;
mod runner;
mod sampler;
mod search;
mod strategy;
mod study;
mod tpe;
mod trial;

pub use analysis::{best_trial, param_importances, HistoryPoint, OptimizationHistory, ParamImportance};
pub use pruner::{MedianPruner, NopPruner, Pruner};
pub use report::{ArtifactPaths, StudyReport, TrialTable};
pub use runner::{AgentState, Trainer, TrialOutcome, TrialRunner};
pub use sampler::{DerivedIterations, DrawSource, ParameterSampler, RandomDraws, ResolvedConfig, SampledConfig};
pub use search::{ParameterDef, ParameterValue, SearchSpace};
pub use strategy::{RandomSearch, SearchStrategy};
pub use study::{CancelToken, StopReason, Study, TrialStore};
pub use tpe::{TpeDraws, TpeSearch, DEFAULT_EI_CANDIDATES};
pub use trial::{StudyId, Trial, TrialStatus, INTERRUPTED};
