//! Study results: summary text, trial table and exported artifacts.

use rt_types::{ObjectiveDirection, RtError, RtResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::analysis::{best_trial, param_importances, OptimizationHistory, ParamImportance};
use crate::study::StopReason;
use crate::trial::{Trial, TrialStatus};

/// Everything a finished (or interrupted) study produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyReport {
    pub study_name: String,
    pub direction: ObjectiveDirection,
    /// Finished trials ordered by number.
    pub trials: Vec<Trial>,
    pub best_trial: Option<Trial>,
    pub stop_reason: StopReason,
    pub elapsed_secs: f64,
    pub history: OptimizationHistory,
    pub importances: Vec<ParamImportance>,
}

impl StudyReport {
    pub fn new(
        study_name: &str,
        direction: ObjectiveDirection,
        mut trials: Vec<Trial>,
        stop_reason: StopReason,
        elapsed: Duration,
    ) -> Self {
        trials.sort_by_key(|t| t.number);
        let best_trial = best_trial(&trials, direction).cloned();
        let history = OptimizationHistory::from_trials(&trials, direction);
        let importances = param_importances(&trials);
        Self {
            study_name: study_name.to_string(),
            direction,
            trials,
            best_trial,
            stop_reason,
            elapsed_secs: elapsed.as_secs_f64(),
            history,
            importances,
        }
    }

    pub fn count(&self, status: TrialStatus) -> usize {
        self.trials.iter().filter(|t| t.status == status).count()
    }

    /// Failed trials that were cut short by cancellation. Included in
    /// `count(TrialStatus::Failed)`.
    pub fn interrupted_count(&self) -> usize {
        self.trials.iter().filter(|t| t.is_interrupted()).count()
    }

    pub fn has_completed_trials(&self) -> bool {
        self.count(TrialStatus::Completed) > 0
    }

    /// Human-readable best-trial block.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Number of finished trials: {}", self.trials.len());
        let interrupted = self.interrupted_count();
        let _ = writeln!(
            out,
            "  Completed: {}  Pruned: {}  Failed: {}  Interrupted: {}",
            self.count(TrialStatus::Completed),
            self.count(TrialStatus::Pruned),
            self.count(TrialStatus::Failed) - interrupted,
            interrupted
        );
        let Some(best) = &self.best_trial else {
            let _ = writeln!(out, "No completed trials.");
            return out;
        };

        let _ = writeln!(out, "Best trial: #{}", best.number);
        if let Some(value) = best.value {
            let _ = writeln!(out, "  Value: {value}");
        }
        let _ = writeln!(out, "  Params:");
        for (key, value) in &best.params {
            let _ = writeln!(out, "    {key}: {value}");
        }
        let _ = writeln!(out, "  User attrs:");
        for (key, value) in &best.user_attrs {
            let _ = writeln!(out, "    {key}: {value}");
        }
        out
    }

    /// One row per trial, with a column per parameter and user attribute seen
    /// anywhere in the study.
    pub fn trial_table(&self) -> TrialTable {
        let param_names: BTreeSet<&str> = self
            .trials
            .iter()
            .flat_map(|t| t.params.keys().map(String::as_str))
            .collect();
        let attr_names: BTreeSet<&str> = self
            .trials
            .iter()
            .flat_map(|t| t.user_attrs.keys().map(String::as_str))
            .collect();

        let mut columns: Vec<String> = [
            "number",
            "state",
            "value",
            "datetime_start",
            "datetime_complete",
            "duration_secs",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        columns.extend(param_names.iter().map(|p| format!("params_{p}")));
        columns.extend(attr_names.iter().map(|a| format!("user_attrs_{a}")));

        let rows = self
            .trials
            .iter()
            .map(|t| {
                let mut row = vec![
                    t.number.to_string(),
                    t.status.to_string(),
                    t.value.map(|v| v.to_string()).unwrap_or_default(),
                    t.started_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
                    t.finished_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
                    t.duration_seconds().map(|d| format!("{d:.3}")).unwrap_or_default(),
                ];
                row.extend(
                    param_names
                        .iter()
                        .map(|p| t.params.get(*p).map(ToString::to_string).unwrap_or_default()),
                );
                row.extend(attr_names.iter().map(|a| match t.user_attrs.get(*a) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                }));
                row
            })
            .collect();

        TrialTable { columns, rows }
    }

    /// Write `<study>_trials.csv`, `<study>_history.json` and
    /// `<study>_importances.json` into `dir`, creating it if needed.
    pub fn write_artifacts(&self, dir: impl AsRef<Path>) -> RtResult<ArtifactPaths> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let paths = ArtifactPaths {
            trials_csv: dir.join(format!("{}_trials.csv", self.study_name)),
            history_json: dir.join(format!("{}_history.json", self.study_name)),
            importances_json: dir.join(format!("{}_importances.json", self.study_name)),
        };

        self.trial_table().write_csv(&paths.trials_csv)?;
        serde_json::to_writer_pretty(BufWriter::new(File::create(&paths.history_json)?), &self.history)?;
        serde_json::to_writer_pretty(
            BufWriter::new(File::create(&paths.importances_json)?),
            &self.importances,
        )?;

        info!(
            trials = %paths.trials_csv.display(),
            history = %paths.history_json.display(),
            importances = %paths.importances_json.display(),
            "wrote study artifacts"
        );
        Ok(paths)
    }
}

/// Locations of the exported artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub trials_csv: PathBuf,
    pub history_json: PathBuf,
    pub importances_json: PathBuf,
}

/// Flat tabular view of the trials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TrialTable {
    pub fn write_csv(&self, path: &Path) -> RtResult<()> {
        let export_err = |e: csv::Error| RtError::Export(format!("{}: {e}", path.display()));
        let mut writer = csv::Writer::from_path(path).map_err(export_err)?;
        writer.write_record(&self.columns).map_err(export_err)?;
        for row in &self.rows {
            writer.write_record(row).map_err(export_err)?;
        }
        writer.flush()?;
        Ok(())
    }
}
