//! Runs one trial: step-wise training, intermediate reports and pruning.

use rt_types::TrainingError;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::pruner::Pruner;
use crate::sampler::{ResolvedConfig, SampledConfig};
use crate::study::{CancelToken, TrialStore};
use crate::trial::Trial;

/// Evaluation signals exposed by an agent after a training step.
///
/// "Mean reward" is treated as an opaque comparable score.
pub trait AgentState: Send {
    /// Whether an evaluation pass finished during the last step.
    fn evaluation_completed(&self) -> bool;

    /// Mean reward over the most recent evaluation pass.
    fn mean_reward(&self) -> f64;

    /// Mean reward at the end of training so far; the trial's final score.
    fn last_mean_reward(&self) -> f64;

    /// Extra values attached to the trial as user attributes on completion.
    fn diagnostics(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }
}

/// A training entry point.
///
/// Each call performs `epochs` bounded units of training starting from
/// `agent` (`None` on the first call) and returns the updated agent. Numerical
/// divergence must be reported as [`TrainingError::Divergence`].
pub trait Trainer: Send + Sync {
    type Agent: AgentState;

    fn train(
        &self,
        config: &ResolvedConfig,
        agent: Option<Self::Agent>,
        epochs: usize,
    ) -> Result<Self::Agent, TrainingError>;
}

/// How a trial ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialOutcome {
    Completed(f64),
    Pruned { step: u64 },
    /// Divergence or a NaN final score; the value is NaN.
    Failed,
    /// Cancellation observed between two steps.
    Interrupted,
}

/// Drives a single trial through `pending -> running -> terminal`.
pub struct TrialRunner<'a> {
    pruner: &'a dyn Pruner,
    store: &'a TrialStore,
    cancel: &'a CancelToken,
    epochs_per_step: usize,
}

impl<'a> TrialRunner<'a> {
    pub fn new(pruner: &'a dyn Pruner, store: &'a TrialStore, cancel: &'a CancelToken) -> Self {
        Self {
            pruner,
            store,
            cancel,
            epochs_per_step: 1,
        }
    }

    /// Number of steps a sampled configuration schedules: its derived
    /// iteration count, and at least one.
    pub fn scheduled_steps(sampled: &SampledConfig) -> u64 {
        sampled.iterations.unwrap_or(1).max(1)
    }

    /// Run `trial` to a terminal state.
    ///
    /// Divergence is absorbed into a failed trial. Any other training error
    /// marks the trial failed and is returned to the caller.
    pub fn run<T: Trainer>(
        &self,
        trainer: &T,
        trial: &mut Trial,
        sampled: &SampledConfig,
        worker_id: Option<String>,
    ) -> Result<TrialOutcome, TrainingError> {
        trial.mark_running(worker_id);
        let n_steps = Self::scheduled_steps(sampled);
        let mut agent: Option<T::Agent> = None;

        for step in 0..n_steps {
            if self.cancel.is_cancelled() {
                info!(trial = trial.number, step, "trial interrupted");
                trial.mark_interrupted();
                return Ok(TrialOutcome::Interrupted);
            }

            let state = match trainer.train(&sampled.config, agent.take(), self.epochs_per_step) {
                Ok(state) => state,
                Err(TrainingError::Divergence { message }) => {
                    warn!(trial = trial.number, step, %message, "trial diverged");
                    trial.mark_failed(message);
                    return Ok(TrialOutcome::Failed);
                }
                Err(e) => {
                    trial.mark_failed(e.to_string());
                    return Err(e);
                }
            };

            if state.evaluation_completed() {
                let score = state.mean_reward();
                debug!(trial = trial.number, step, score, "intermediate score");
                trial.report(step, score);

                let prune = {
                    let finished = self.store.read();
                    self.pruner.should_prune(step, &trial.intermediate_values, &finished)
                };
                if prune {
                    info!(trial = trial.number, step, score, "trial pruned");
                    trial.mark_pruned();
                    return Ok(TrialOutcome::Pruned { step });
                }
            }
            agent = Some(state);
        }

        let Some(agent) = agent else {
            trial.mark_failed("no training step ran");
            return Ok(TrialOutcome::Failed);
        };

        for (key, value) in agent.diagnostics() {
            trial.set_user_attr(key, value);
        }
        let value = agent.last_mean_reward();
        if value.is_nan() {
            warn!(trial = trial.number, "final mean reward is NaN");
            trial.mark_failed("final mean reward is NaN");
            return Ok(TrialOutcome::Failed);
        }
        trial.mark_completed(value);
        Ok(TrialOutcome::Completed(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pruner::{MedianPruner, NopPruner};
    use crate::sampler::{ParameterSampler, RandomDraws};
    use crate::search::SearchSpace;
    use crate::trial::TrialStatus;
    use rt_types::ObjectiveDirection;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Debug)]
    struct ScriptedAgent {
        epochs: usize,
        last: f64,
    }

    impl AgentState for ScriptedAgent {
        fn evaluation_completed(&self) -> bool {
            true
        }

        fn mean_reward(&self) -> f64 {
            self.last
        }

        fn last_mean_reward(&self) -> f64 {
            self.last
        }

        fn diagnostics(&self) -> BTreeMap<String, serde_json::Value> {
            BTreeMap::from([("epochs_trained".to_string(), json!(self.epochs))])
        }
    }

    /// Replays a fixed reward curve; `fail_at` turns step `n` into an error.
    struct ScriptedTrainer {
        curve: Vec<f64>,
        fail_at: Option<(usize, TrainingError)>,
        calls: AtomicUsize,
    }

    impl ScriptedTrainer {
        fn new(curve: Vec<f64>) -> Self {
            Self {
                curve,
                fail_at: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(step: usize, error: TrainingError) -> Self {
            Self {
                fail_at: Some((step, error)),
                ..Self::new(vec![1.0; 8])
            }
        }
    }

    impl Trainer for ScriptedTrainer {
        type Agent = ScriptedAgent;

        fn train(
            &self,
            _config: &ResolvedConfig,
            agent: Option<ScriptedAgent>,
            epochs: usize,
        ) -> Result<ScriptedAgent, TrainingError> {
            assert_eq!(epochs, 1);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let done = agent.map_or(0, |a| a.epochs);
            if let Some((step, error)) = &self.fail_at {
                if *step == done {
                    return Err(error.clone());
                }
            }
            Ok(ScriptedAgent {
                epochs: done + 1,
                last: self.curve[done],
            })
        }
    }

    fn sampled(iterations: u64) -> SampledConfig {
        let space = SearchSpace::new().add_pow2("n_steps", 0, 0);
        let sampler = ParameterSampler::new(space, json!({}), None).unwrap();
        let mut sampled = sampler.sample(&mut RandomDraws::seeded(0)).unwrap();
        sampled.iterations = Some(iterations);
        sampled
    }

    fn new_trial(number: usize) -> Trial {
        Trial::new(Uuid::nil(), number, BTreeMap::new())
    }

    fn finished(curve: &[f64], number: usize) -> Trial {
        let mut trial = new_trial(number);
        trial.mark_running(None);
        for (step, v) in curve.iter().enumerate() {
            trial.report(step as u64, *v);
        }
        trial.mark_completed(*curve.last().unwrap());
        trial
    }

    #[test]
    fn completes_all_scheduled_steps() {
        let store = TrialStore::default();
        let cancel = CancelToken::new();
        let runner = TrialRunner::new(&NopPruner, &store, &cancel);
        let trainer = ScriptedTrainer::new(vec![1.0, 2.0, 3.0, 4.0]);
        let mut trial = new_trial(0);

        let outcome = runner.run(&trainer, &mut trial, &sampled(4), None).unwrap();
        assert_eq!(outcome, TrialOutcome::Completed(4.0));
        assert_eq!(trial.status, TrialStatus::Completed);
        assert_eq!(trial.value, Some(4.0));
        assert_eq!(trial.intermediate_values.len(), 4);
        assert_eq!(trial.user_attrs["epochs_trained"], json!(4));
        assert_eq!(trainer.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn divergence_on_first_step_fails_trial_without_error() {
        let store = TrialStore::default();
        let cancel = CancelToken::new();
        let runner = TrialRunner::new(&NopPruner, &store, &cancel);
        let trainer = ScriptedTrainer::failing(0, TrainingError::divergence("actor weights are NaN"));
        let mut trial = new_trial(0);

        let outcome = runner.run(&trainer, &mut trial, &sampled(5), None).unwrap();
        assert_eq!(outcome, TrialOutcome::Failed);
        assert_eq!(trial.status, TrialStatus::Failed);
        assert!(trial.value.unwrap().is_nan());
        assert!(trial.intermediate_values.is_empty());
        assert_eq!(trainer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fatal_error_propagates() {
        let store = TrialStore::default();
        let cancel = CancelToken::new();
        let runner = TrialRunner::new(&NopPruner, &store, &cancel);
        let trainer = ScriptedTrainer::failing(2, TrainingError::fatal("environment crashed"));
        let mut trial = new_trial(0);

        let err = runner.run(&trainer, &mut trial, &sampled(5), None).unwrap_err();
        assert!(!err.is_divergence());
        assert_eq!(trial.status, TrialStatus::Failed);
        assert_eq!(trial.intermediate_values.len(), 2);
    }

    #[test]
    fn pruned_trial_stops_reporting() {
        let store = TrialStore::default();
        for i in 0..3 {
            store.push(finished(&[10.0, 20.0, 30.0, 40.0], i));
        }
        let cancel = CancelToken::new();
        let pruner = MedianPruner::new(ObjectiveDirection::Maximize)
            .n_startup_trials(3)
            .n_warmup_steps(1);
        let runner = TrialRunner::new(&pruner, &store, &cancel);
        let trainer = ScriptedTrainer::new(vec![0.0, 1.0, 100.0, 100.0]);
        let mut trial = new_trial(3);

        let outcome = runner.run(&trainer, &mut trial, &sampled(4), None).unwrap();
        assert_eq!(outcome, TrialOutcome::Pruned { step: 1 });
        assert_eq!(trial.status, TrialStatus::Pruned);
        assert_eq!(trial.last_step(), Some(1));
        assert_eq!(trial.value, None);
        assert_eq!(trainer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancellation_between_steps_interrupts() {
        let store = TrialStore::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let runner = TrialRunner::new(&NopPruner, &store, &cancel);
        let trainer = ScriptedTrainer::new(vec![1.0; 3]);
        let mut trial = new_trial(0);

        let outcome = runner.run(&trainer, &mut trial, &sampled(3), None).unwrap();
        assert_eq!(outcome, TrialOutcome::Interrupted);
        assert_eq!(trial.status, TrialStatus::Failed);
        assert!(trial.is_interrupted());
        assert_eq!(trainer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn nan_final_reward_fails_trial() {
        let store = TrialStore::default();
        let cancel = CancelToken::new();
        let runner = TrialRunner::new(&NopPruner, &store, &cancel);
        let trainer = ScriptedTrainer::new(vec![1.0, f64::NAN]);
        let mut trial = new_trial(0);

        let outcome = runner.run(&trainer, &mut trial, &sampled(2), None).unwrap();
        assert_eq!(outcome, TrialOutcome::Failed);
        assert_eq!(trial.status, TrialStatus::Failed);
    }

    #[test]
    fn zero_iterations_still_runs_one_step() {
        assert_eq!(TrialRunner::scheduled_steps(&sampled(0)), 1);
        assert_eq!(TrialRunner::scheduled_steps(&sampled(7)), 7);
    }
}
