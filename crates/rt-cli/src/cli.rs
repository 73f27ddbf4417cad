use clap::Parser;
use std::path::PathBuf;

/// Tune the hyperparameters of a reinforcement-learning trainer.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "rltune")]
#[command(version)]
pub struct Cli {
    /// Tuning configuration file (YAML or JSON), relative to --config-dir
    pub config: PathBuf,

    /// Registered trainer to tune
    pub trainer: String,

    /// Directory holding configuration files
    #[arg(long, default_value = "configs")]
    pub config_dir: PathBuf,

    /// Where the trial table and chart data are written
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Study name; defaults to the configured name, then the config file stem
    #[arg(long)]
    pub study_name: Option<String>,
}

impl Cli {
    /// Absolute or config-dir-relative path of the tuning file.
    pub fn config_path(&self) -> PathBuf {
        if self.config.is_absolute() {
            self.config.clone()
        } else {
            self.config_dir.join(&self.config)
        }
    }

    /// Name used when neither --study-name nor the config provide one.
    pub fn default_study_name(&self) -> String {
        self.config
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "study".to_string())
    }
}
