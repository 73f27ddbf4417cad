//! Trial records and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::search::ParameterValue;

/// Error recorded on a trial cut short by cancellation.
pub const INTERRUPTED: &str = "interrupted";

/// Unique study identifier.
pub type StudyId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Pruned,
    Failed,
}

impl TrialStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Pruned | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Pruned => "pruned",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trial: one sampled configuration and its training outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub study_id: StudyId,
    /// Position in the study, 0-indexed, in order of creation.
    pub number: usize,
    pub params: BTreeMap<String, ParameterValue>,
    /// `(step, mean reward)` pairs reported while training.
    pub intermediate_values: Vec<(u64, f64)>,
    pub status: TrialStatus,
    /// Final score. NaN for failed trials, `None` while running or if pruned.
    pub value: Option<f64>,
    pub user_attrs: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(study_id: StudyId, number: usize, params: BTreeMap<String, ParameterValue>) -> Self {
        Self {
            id: Uuid::new_v4(),
            study_id,
            number,
            params,
            intermediate_values: Vec::new(),
            status: TrialStatus::Pending,
            value: None,
            user_attrs: BTreeMap::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            worker_id: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self, worker_id: Option<String>) {
        debug_assert_eq!(self.status, TrialStatus::Pending);
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
        self.worker_id = worker_id;
    }

    /// Record an intermediate score. Ignored once the trial is terminal.
    pub fn report(&mut self, step: u64, value: f64) {
        if self.status.is_terminal() {
            return;
        }
        self.intermediate_values.push((step, value));
    }

    pub fn last_step(&self) -> Option<u64> {
        self.intermediate_values.last().map(|(step, _)| *step)
    }

    pub fn set_user_attr(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.user_attrs.insert(key.into(), value.into());
    }

    pub fn mark_completed(&mut self, value: f64) {
        self.finish(TrialStatus::Completed);
        self.value = Some(value);
    }

    pub fn mark_pruned(&mut self) {
        self.finish(TrialStatus::Pruned);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.finish(TrialStatus::Failed);
        self.value = Some(f64::NAN);
        self.error = Some(error.into());
    }

    /// Failed because the study was cancelled mid-trial, not because training
    /// diverged.
    pub fn mark_interrupted(&mut self) {
        self.mark_failed(INTERRUPTED);
    }

    pub fn is_interrupted(&self) -> bool {
        self.status == TrialStatus::Failed && self.error.as_deref() == Some(INTERRUPTED)
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    /// Completed value usable for ranking (finite or infinite, never NaN).
    pub fn ranked_value(&self) -> Option<f64> {
        match (self.status, self.value) {
            (TrialStatus::Completed, Some(v)) if !v.is_nan() => Some(v),
            _ => None,
        }
    }

    fn finish(&mut self, status: TrialStatus) {
        debug_assert!(!self.status.is_terminal(), "trial {} already finished", self.number);
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<String, ParameterValue> {
        let mut params = BTreeMap::new();
        params.insert("n_steps".to_string(), ParameterValue::Int(8));
        params
    }

    #[test]
    fn trial_lifecycle() {
        let mut trial = Trial::new(Uuid::new_v4(), 1, params());
        assert_eq!(trial.status, TrialStatus::Pending);

        trial.mark_running(Some("worker-0".into()));
        assert_eq!(trial.status, TrialStatus::Running);
        assert_eq!(trial.worker_id.as_deref(), Some("worker-0"));

        trial.report(0, 12.5);
        trial.report(1, 20.0);
        assert_eq!(trial.last_step(), Some(1));

        trial.mark_completed(20.0);
        assert_eq!(trial.status, TrialStatus::Completed);
        assert!(trial.finished_at.is_some());
        assert!(trial.duration_seconds().is_some());
        assert_eq!(trial.ranked_value(), Some(20.0));
    }

    #[test]
    fn failed_trial_carries_nan() {
        let mut trial = Trial::new(Uuid::new_v4(), 0, BTreeMap::new());
        trial.mark_running(None);
        trial.mark_failed("critic loss is NaN");
        assert_eq!(trial.status, TrialStatus::Failed);
        assert!(trial.value.unwrap().is_nan());
        assert_eq!(trial.ranked_value(), None);
        assert_eq!(trial.error.as_deref(), Some("critic loss is NaN"));
    }

    #[test]
    fn pruned_trial_ignores_later_reports() {
        let mut trial = Trial::new(Uuid::new_v4(), 2, params());
        trial.mark_running(None);
        trial.report(0, 1.0);
        trial.mark_pruned();
        trial.report(1, 99.0);
        assert_eq!(trial.intermediate_values, vec![(0, 1.0)]);
        assert_eq!(trial.value, None);
        assert_eq!(trial.ranked_value(), None);
    }

    #[test]
    fn status_names() {
        assert_eq!(TrialStatus::Pruned.to_string(), "pruned");
        assert!(TrialStatus::Failed.is_terminal());
        assert!(!TrialStatus::Running.is_terminal());
    }

    #[test]
    fn trial_serializes() {
        let mut trial = Trial::new(Uuid::new_v4(), 3, params());
        trial.set_user_attr("n_epochs", 781);
        let json = serde_json::to_value(&trial).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["params"]["n_steps"], 8);
        assert_eq!(json["user_attrs"]["n_epochs"], 781);
    }
}
