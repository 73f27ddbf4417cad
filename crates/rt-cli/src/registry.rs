//! Trainers selectable from the command line.
//!
//! Each entry runs a study with one concrete `Trainer` type, so the generic
//! search loop is monomorphized per trainer and the lookup happens once.

use rt_optimizer::{CancelToken, Study, StudyReport};
use rt_types::{config_error, RtResult};

use crate::surrogate::SurrogateTrainer;

pub type TrainerEntry = fn(&Study, &CancelToken) -> RtResult<StudyReport>;

const TRAINERS: &[(&str, TrainerEntry)] = &[("surrogate", run_surrogate)];

fn run_surrogate(study: &Study, cancel: &CancelToken) -> RtResult<StudyReport> {
    let trainer = SurrogateTrainer::new(study.settings().seed.unwrap_or(0));
    study.optimize(&trainer, cancel)
}

pub fn known_trainers() -> Vec<&'static str> {
    TRAINERS.iter().map(|(name, _)| *name).collect()
}

pub fn lookup(name: &str) -> RtResult<TrainerEntry> {
    TRAINERS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, entry)| *entry)
        .ok_or_else(|| {
            config_error!(
                "unknown trainer '{name}', expected one of: {}",
                known_trainers().join(", ")
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_optimizer::{ParameterSampler, SearchSpace, TrialStatus};
    use rt_types::{RtError, StudySettings};
    use serde_json::json;

    #[test]
    fn unknown_trainer_lists_known_names() {
        let err = lookup("ppo").err().unwrap();
        assert!(matches!(err, RtError::Config(_)));
        assert!(err.to_string().contains("surrogate"));
    }

    #[test]
    fn surrogate_entry_runs_a_study() {
        let space = SearchSpace::new()
            .add_log_uniform("actor_lr", 1e-5, 1e-2)
            .add_int("batch_size", 100, 300);
        let sampler = ParameterSampler::new(space, json!({}), None).unwrap();
        let settings = StudySettings::default().with_n_trials(4).with_seed(5);
        let study = Study::new("registry", settings, sampler).unwrap();

        let entry = lookup("surrogate").unwrap();
        let report = entry(&study, &CancelToken::new()).unwrap();
        assert_eq!(report.trials.len(), 4);
        assert_eq!(report.count(TrialStatus::Completed), 4);
    }

    #[test]
    fn bundled_swimmer_config_runs() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/td3_swimmer.yaml");
        let mut config = rt_types::TuneConfig::from_path(path).unwrap();
        config.study = config.study.with_n_trials(6).with_n_jobs(2);

        let study = Study::from_config(&config, "unused").unwrap();
        assert_eq!(study.name(), "td3_swimmer");
        let report = lookup("surrogate").unwrap()(&study, &CancelToken::new()).unwrap();

        assert_eq!(report.trials.len(), 6);
        for trial in &report.trials {
            let exponent = trial.params["n_steps"].as_f64();
            assert!((7.0..=10.0).contains(&exponent));
            let epochs = trial.user_attrs["algorithm.max_epochs"].as_u64().unwrap();
            assert_eq!(epochs, 16384 >> exponent as u32);
        }
    }
}
