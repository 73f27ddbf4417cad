//! Early-stopping policies consulted after every reported intermediate score.

use rt_types::ObjectiveDirection;

use crate::trial::{Trial, TrialStatus};

/// Decides whether a running trial should be abandoned.
///
/// One pruner is shared by every worker of a study, hence `Send + Sync`.
/// `trials` is the study's record of finished trials; only terminal trials are
/// ever stored there, so a partially written trial is never observed.
pub trait Pruner: Send + Sync {
    fn should_prune(&self, step: u64, intermediate_values: &[(u64, f64)], trials: &[Trial]) -> bool;

    fn name(&self) -> &str;
}

/// Never prunes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopPruner;

impl Pruner for NopPruner {
    fn should_prune(&self, _step: u64, _intermediate_values: &[(u64, f64)], _trials: &[Trial]) -> bool {
        false
    }

    fn name(&self) -> &str {
        "nop"
    }
}

/// Median-stopping rule.
///
/// A trial is pruned when its score at a step is worse than the median of the
/// scores completed trials reported at that same step. Nothing is pruned
/// before `n_warmup_steps` steps, nor before `n_startup_trials` trials have
/// completed.
#[derive(Debug, Clone)]
pub struct MedianPruner {
    direction: ObjectiveDirection,
    n_startup_trials: usize,
    n_warmup_steps: u64,
}

impl MedianPruner {
    pub fn new(direction: ObjectiveDirection) -> Self {
        Self {
            direction,
            n_startup_trials: 5,
            n_warmup_steps: 0,
        }
    }

    #[must_use]
    pub fn n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    #[must_use]
    pub fn n_warmup_steps(mut self, n: u64) -> Self {
        self.n_warmup_steps = n;
        self
    }
}

impl Pruner for MedianPruner {
    fn should_prune(&self, step: u64, intermediate_values: &[(u64, f64)], trials: &[Trial]) -> bool {
        if step < self.n_warmup_steps {
            return false;
        }

        let completed: Vec<&Trial> = trials
            .iter()
            .filter(|t| t.status == TrialStatus::Completed)
            .collect();
        if completed.is_empty() || completed.len() < self.n_startup_trials {
            return false;
        }

        let Some(current) = intermediate_values
            .iter()
            .rev()
            .find(|(s, _)| *s == step)
            .map(|(_, v)| *v)
        else {
            return false;
        };

        let mut values_at_step: Vec<f64> = completed
            .iter()
            .filter_map(|t| {
                t.intermediate_values
                    .iter()
                    .find(|(s, _)| *s == step)
                    .map(|(_, v)| *v)
            })
            .filter(|v| !v.is_nan())
            .collect();
        if values_at_step.is_empty() {
            return false;
        }

        if current.is_nan() {
            return true;
        }

        let median = compute_median(&mut values_at_step);
        self.direction.is_better(median, current)
    }

    fn name(&self) -> &str {
        "median"
    }
}

/// Median of a non-empty slice. Sorts the slice in place.
fn compute_median(values: &mut [f64]) -> f64 {
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let len = values.len();
    if len % 2 == 1 {
        values[len / 2]
    } else {
        (values[len / 2 - 1] + values[len / 2]) / 2.0
    }
}
