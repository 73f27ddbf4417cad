//! `rltune`: run a hyperparameter study for a registered trainer.

mod cli;
mod registry;
mod surrogate;

use anyhow::{Context, Result};
use clap::Parser;
use rt_optimizer::{CancelToken, StopReason, Study, StudyReport};
use rt_types::TuneConfig;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let entry = registry::lookup(&cli.trainer)?;

    let config_path = cli.config_path();
    let mut config = TuneConfig::from_path(&config_path)
        .with_context(|| format!("loading tuning config {}", config_path.display()))?;
    if let Some(name) = &cli.study_name {
        config.study.name = Some(name.clone());
    }
    let study = Study::from_config(&config, &cli.default_study_name())?;
    info!(
        study = study.name(),
        trainer = %cli.trainer,
        config = %config_path.display(),
        parameters = config.search_space.len(),
        "study configured"
    );

    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing after the current training steps");
            interrupt.cancel();
        }
    });

    let started = Instant::now();
    let (outcome, study) = tokio::task::spawn_blocking(move || {
        let outcome = entry(&study, &cancel);
        (outcome, study)
    })
    .await
    .context("study worker panicked")?;

    match outcome {
        Ok(report) => {
            publish(&report, &cli.output_dir)?;
            Ok(())
        }
        Err(e) => {
            error!(study = study.name(), error = %e, "study failed");
            publish(&study.report(StopReason::Aborted, started.elapsed()), &cli.output_dir)?;
            Err(e.into())
        }
    }
}

/// Print the summary and, when anything completed, write the artifacts.
fn publish(report: &StudyReport, output_dir: &Path) -> Result<()> {
    println!("{}", report.summary());
    if !report.has_completed_trials() {
        warn!(study = %report.study_name, "no completed trials, nothing to export");
        return Ok(());
    }
    report
        .write_artifacts(output_dir)
        .with_context(|| format!("writing results to {}", output_dir.display()))?;
    Ok(())
}
