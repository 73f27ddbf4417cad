//! Tuning configuration document and study-level settings.
//!
//! A tuning file carries four sections:
//!
//! ```yaml
//! study:
//!   n_trials: 100
//!   n_jobs: 2
//!   timeout: 3600
//!   n_startup_trials: 10
//!   n_warmup_steps: 5
//! search_space:
//!   - { name: actor_lr, min: 1.0e-5, max: 1.0e-2, scale: log, target: actor_optimizer.lr }
//!   - { name: n_steps, min: 7, max: 10, scale: pow2, target: algorithm.n_steps }
//! derived_iterations:
//!   budget: algorithm.n_timesteps
//!   step: algorithm.n_steps
//!   target: algorithm.max_epochs
//! base:
//!   algorithm: { n_timesteps: 100000 }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config_error;
use crate::errors::RtResult;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// `true` when `candidate` is strictly better than `incumbent`.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

/// How a parameter's bounds are turned into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// Uniform float in `[min, max]`.
    #[default]
    Linear,
    /// Uniform integer in `[min, max]`.
    Int,
    /// Uniform in log-space over `[min, max]`; both bounds must be positive.
    #[serde(alias = "logarithmic")]
    Log,
    /// Integer exponent `e` in `[min, max]`, materialized as `2^e`.
    #[serde(alias = "power_of_two")]
    Pow2,
}

/// One searchable parameter as declared in the tuning file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub scale: Scale,
    /// Dotted path in the base configuration. Defaults to `name`.
    #[serde(default)]
    pub target: Option<String>,
    /// Replicate the sampled value into a list of this length.
    #[serde(default)]
    pub layers: Option<usize>,
}

/// Iteration count derived as `budget / step` after sampling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedIterationsSpec {
    pub budget: String,
    pub step: String,
    pub target: String,
}

/// Study-level settings: budgets, parallelism, warm-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudySettings {
    pub name: Option<String>,
    pub n_trials: Option<usize>,
    pub n_jobs: usize,
    /// Wall-clock budget in seconds.
    pub timeout: Option<u64>,
    /// Trials sampled quasi-randomly before the density model kicks in. Also
    /// the number of completed trials required before anything is pruned.
    pub n_startup_trials: usize,
    /// Steps a trial always runs before it may be pruned. Passed to the
    /// median pruner as given.
    pub n_warmup_steps: u64,
    pub seed: Option<u64>,
    pub direction: ObjectiveDirection,
    pub pruning: bool,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            name: None,
            n_trials: Some(100),
            n_jobs: 1,
            timeout: None,
            n_startup_trials: 10,
            n_warmup_steps: 0,
            seed: None,
            direction: ObjectiveDirection::Maximize,
            pruning: true,
        }
    }
}

impl StudySettings {
    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = Some(n);
        self
    }

    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = n;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_warmup_steps(mut self, n: u64) -> Self {
        self.n_warmup_steps = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_pruning(mut self, enabled: bool) -> Self {
        self.pruning = enabled;
        self
    }

    pub fn validate(&self) -> RtResult<()> {
        if self.n_jobs == 0 {
            return Err(config_error!("study.n_jobs must be at least 1"));
        }
        if self.n_trials.is_none() && self.timeout.is_none() {
            return Err(config_error!(
                "study needs a trial budget (n_trials) or a timeout"
            ));
        }
        if self.n_trials == Some(0) {
            return Err(config_error!("study.n_trials must be at least 1"));
        }
        Ok(())
    }
}

/// The whole tuning document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneConfig {
    #[serde(default)]
    pub study: StudySettings,
    pub search_space: Vec<ParameterSpec>,
    #[serde(default)]
    pub derived_iterations: Option<DerivedIterationsSpec>,
    /// Base training configuration. Trials override sampled fields on a copy.
    #[serde(default)]
    pub base: serde_json::Value,
}

impl TuneConfig {
    /// Load a tuning file, picking the format from the extension.
    pub fn from_path(path: impl AsRef<Path>) -> RtResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&raw),
            other => Err(config_error!(
                "unsupported config extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            )),
        }
    }

    pub fn from_yaml_str(raw: &str) -> RtResult<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> RtResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RtResult<()> {
        self.study.validate()?;
        if self.search_space.is_empty() {
            return Err(config_error!("search_space declares no parameters"));
        }
        if !self.base.is_null() && !self.base.is_object() {
            return Err(config_error!("base configuration must be a mapping"));
        }
        Ok(())
    }
}
