use thiserror::Error;

/// Main error type for the RLTune system
#[derive(Error, Debug)]
pub enum RtError {
    #[error("Search space error: {0}")]
    SearchSpace(#[from] SearchSpaceError),

    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Malformed search-space declarations. Always fatal: the study cannot start.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchSpaceError {
    #[error("Empty parameter name")]
    EmptyName,

    #[error("Duplicate parameter: {name}")]
    DuplicateParameter { name: String },

    #[error("Non-finite bounds for {name}: [{low}, {high}]")]
    NonFiniteBounds { name: String, low: f64, high: f64 },

    #[error("Range of {name} is too wide to sample: [{low}, {high}]")]
    RangeTooWide { name: String, low: f64, high: f64 },

    #[error("Invalid bounds for {name}: low {low} is greater than high {high}")]
    InvalidBounds { name: String, low: f64, high: f64 },

    #[error("Log-scale parameter {name} needs strictly positive bounds, got [{low}, {high}]")]
    NonPositiveLogBounds { name: String, low: f64, high: f64 },

    #[error("Parameter {name} needs integer bounds, got [{low}, {high}]")]
    NonIntegerBounds { name: String, low: f64, high: f64 },

    #[error("Power-of-two parameter {name} needs exponents in [0, 62], got [{low}, {high}]")]
    ExponentOutOfRange { name: String, low: f64, high: f64 },

    #[error("Parameter {name} must replicate into at least one layer")]
    ZeroLayers { name: String },

    #[error("Invalid target path {target:?} for {name}: {message}")]
    InvalidTarget {
        name: String,
        target: String,
        message: String,
    },

    #[error("Derived iteration count error: {message}")]
    DerivedIterations { message: String },
}

/// Failures reported by a training entry point.
///
/// `Divergence` is the value-validity failure: random draws are expected to
/// blow up now and then, so the trial is marked failed and the study carries
/// on. `Fatal` is a defect and aborts the study.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    #[error("Numerical divergence: {message}")]
    Divergence { message: String },

    #[error("Training failed: {message}")]
    Fatal { message: String },
}

impl TrainingError {
    pub fn divergence(message: impl Into<String>) -> Self {
        Self::Divergence {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::Divergence { .. })
    }
}

/// Result type alias for RLTune operations
pub type RtResult<T> = Result<T, RtError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::RtError::Config(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::RtError::Internal(format!($($arg)*))
    };
}
