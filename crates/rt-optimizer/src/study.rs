//! Study controller: owns the search loop and the shared trial history.

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use rt_types::{internal_error, ObjectiveDirection, RtError, RtResult, StudySettings, TuneConfig};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

use crate::pruner::{MedianPruner, NopPruner, Pruner};
use crate::report::StudyReport;
use crate::runner::{Trainer, TrialOutcome, TrialRunner};
use crate::sampler::{DerivedIterations, ParameterSampler};
use crate::search::SearchSpace;
use crate::strategy::SearchStrategy;
use crate::tpe::TpeSearch;
use crate::trial::{StudyId, Trial, TrialStatus};

/// Cooperative cancellation shared between the search loop and whoever
/// interrupts it (e.g. a Ctrl-C handler). Honored between training steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Finished trials. Only terminal trials are pushed, so readers never see a
/// partially written record.
#[derive(Debug, Default)]
pub struct TrialStore {
    trials: RwLock<Vec<Trial>>,
}

impl TrialStore {
    pub fn push(&self, trial: Trial) {
        debug_assert!(trial.status.is_terminal());
        self.trials.write().push(trial);
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Trial>> {
        self.trials.read()
    }

    /// All trials ordered by trial number.
    pub fn snapshot(&self) -> Vec<Trial> {
        let mut trials = self.trials.read().clone();
        trials.sort_by_key(|t| t.number);
        trials
    }

    pub fn len(&self) -> usize {
        self.trials.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.read().is_empty()
    }
}

/// Why the search loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TrialBudget,
    Timeout,
    Cancelled,
    /// A fatal training or sampling error stopped the workers.
    Aborted,
}

/// The full search across many trials.
pub struct Study {
    id: StudyId,
    name: String,
    settings: StudySettings,
    sampler: ParameterSampler,
    strategy: Mutex<Box<dyn SearchStrategy>>,
    pruner: Box<dyn Pruner>,
    store: TrialStore,
    next_number: AtomicUsize,
}

impl Study {
    /// Create a study with a TPE strategy and a median pruner configured from
    /// `settings`.
    pub fn new(name: impl Into<String>, settings: StudySettings, sampler: ParameterSampler) -> RtResult<Self> {
        settings.validate()?;
        let strategy = TpeSearch::new(settings.direction, settings.seed)
            .n_startup_trials(settings.n_startup_trials);
        let pruner: Box<dyn Pruner> = if settings.pruning {
            Box::new(
                MedianPruner::new(settings.direction)
                    .n_startup_trials(settings.n_startup_trials)
                    .n_warmup_steps(settings.n_warmup_steps),
            )
        } else {
            Box::new(NopPruner)
        };

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            settings,
            sampler,
            strategy: Mutex::new(Box::new(strategy)),
            pruner,
            store: TrialStore::default(),
            next_number: AtomicUsize::new(0),
        })
    }

    /// Build a study from a parsed tuning document. Search-space problems
    /// surface here, before any trial runs.
    pub fn from_config(config: &TuneConfig, default_name: &str) -> RtResult<Self> {
        let space = SearchSpace::from_specs(&config.search_space)?;
        let derived = config.derived_iterations.as_ref().map(DerivedIterations::from);
        let sampler = ParameterSampler::new(space, config.base.clone(), derived)?;
        let name = config
            .study
            .name
            .clone()
            .unwrap_or_else(|| default_name.to_string());
        Self::new(name, config.study.clone(), sampler)
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: impl SearchStrategy + 'static) -> Self {
        self.strategy = Mutex::new(Box::new(strategy));
        self
    }

    #[must_use]
    pub fn with_pruner(mut self, pruner: impl Pruner + 'static) -> Self {
        self.pruner = Box::new(pruner);
        self
    }

    pub fn id(&self) -> StudyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &StudySettings {
        &self.settings
    }

    pub fn direction(&self) -> ObjectiveDirection {
        self.settings.direction
    }

    /// Finished trials ordered by number.
    pub fn trials(&self) -> Vec<Trial> {
        self.store.snapshot()
    }

    /// Best completed trial; ties go to the earliest trial.
    pub fn best_trial(&self) -> Option<Trial> {
        crate::analysis::best_trial(&self.store.snapshot(), self.direction()).cloned()
    }

    /// Report over the trials finished so far.
    pub fn report(&self, stop_reason: StopReason, elapsed: Duration) -> StudyReport {
        StudyReport::new(&self.name, self.direction(), self.store.snapshot(), stop_reason, elapsed)
    }

    /// Run the search until the trial budget, the timeout or cancellation.
    ///
    /// Cancellation is not an error: the report covers the trials finished so
    /// far. A fatal training error or a sampling error stops every worker and
    /// is returned once they have drained.
    pub fn optimize<T: Trainer>(&self, trainer: &T, cancel: &CancelToken) -> RtResult<StudyReport> {
        let started = Instant::now();
        // A timeout too large to represent as an instant means no deadline.
        let deadline = self
            .settings
            .timeout
            .and_then(|secs| started.checked_add(Duration::from_secs(secs)));
        let n_jobs = self.settings.n_jobs.max(1);
        let halt = AtomicBool::new(false);
        let fatal: Mutex<Option<RtError>> = Mutex::new(None);
        let stop_reason: Mutex<StopReason> = Mutex::new(StopReason::TrialBudget);

        info!(
            study = %self.name,
            n_trials = ?self.settings.n_trials,
            n_jobs,
            timeout = ?self.settings.timeout,
            strategy = self.strategy.lock().name(),
            pruner = self.pruner.name(),
            "starting study"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_jobs)
            .thread_name(|i| format!("rt-trial-{i}"))
            .build()
            .map_err(|e| internal_error!("failed to start trial workers: {e}"))?;

        let worker = |worker_index: usize| {
            let outcome = self.run_worker(worker_index, trainer, cancel, deadline, &halt);
            match outcome {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    let mut current = stop_reason.lock();
                    if reason != StopReason::TrialBudget {
                        *current = reason;
                    }
                }
                Err(e) => {
                    halt.store(true, Ordering::SeqCst);
                    let mut slot = fatal.lock();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
            }
        };
        pool.scope(|scope| {
            for worker_index in 0..n_jobs {
                let worker = &worker;
                scope.spawn(move |_| worker(worker_index));
            }
        });

        if let Some(e) = fatal.into_inner() {
            error!(study = %self.name, error = %e, "study aborted");
            return Err(e);
        }

        let report = self.report(stop_reason.into_inner(), started.elapsed());
        info!(
            study = %self.name,
            finished = report.trials.len(),
            completed = report.count(TrialStatus::Completed),
            pruned = report.count(TrialStatus::Pruned),
            failed = report.count(TrialStatus::Failed),
            stop = ?report.stop_reason,
            "study finished"
        );
        Ok(report)
    }

    /// One worker's loop. Returns the stop reason it observed.
    fn run_worker<T: Trainer>(
        &self,
        worker_index: usize,
        trainer: &T,
        cancel: &CancelToken,
        deadline: Option<Instant>,
        halt: &AtomicBool,
    ) -> RtResult<Option<StopReason>> {
        loop {
            if halt.load(Ordering::SeqCst) {
                return Ok(None);
            }
            if cancel.is_cancelled() {
                return Ok(Some(StopReason::Cancelled));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(Some(StopReason::Timeout));
            }
            let Some(number) = self.claim_trial_number() else {
                return Ok(Some(StopReason::TrialBudget));
            };

            let mut draws = self.strategy.lock().draw_source();
            let sampled = self.sampler.sample(draws.as_mut())?;

            let mut trial = Trial::new(self.id, number, sampled.params.clone());
            if let (Some(iterations), Some(derived)) = (sampled.iterations, self.sampler.derived()) {
                trial.set_user_attr(derived.target.clone(), iterations);
            }

            let runner = TrialRunner::new(self.pruner.as_ref(), &self.store, cancel);
            let result = runner.run(trainer, &mut trial, &sampled, Some(format!("worker-{worker_index}")));

            if let Ok(TrialOutcome::Completed(value)) = result {
                self.strategy.lock().report(&trial.params, value);
                let is_best = self
                    .best_trial()
                    .and_then(|best| best.ranked_value())
                    .map_or(true, |best| self.direction().is_better(value, best));
                info!(trial = number, value, params = ?trial.params, "trial completed");
                if is_best {
                    info!(trial = number, value, "new best trial");
                }
            }
            self.store.push(trial);

            match result {
                Ok(TrialOutcome::Interrupted) => return Ok(Some(StopReason::Cancelled)),
                Ok(_) => {}
                Err(e) => return Err(RtError::Training(e)),
            }
        }
    }

    /// Next trial number, or `None` once the trial budget is used up.
    fn claim_trial_number(&self) -> Option<usize> {
        let budget = self.settings.n_trials.unwrap_or(usize::MAX);
        self.next_number
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < budget).then_some(n + 1))
            .ok()
    }
}
