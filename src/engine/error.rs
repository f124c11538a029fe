//! Step error types

use std::path::{Path, PathBuf};

use crate::telemetry::TelemetryError;
use crate::workflow::{ConfigError, ParseError, ValidationError};

/// Errors that abort a run
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl From<ConfigError> for StepError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Parse(e) => StepError::Parse(e),
            ConfigError::Validation(e) => StepError::Validation(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Workflow '{0}' already exists, refusing to overwrite it")]
    NameCollision(String),

    #[error("Failed to serialize synthesized config: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// An I/O failure other than "not found"
#[derive(Debug, thiserror::Error)]
#[error("{} ({})", .source, .path.display())]
pub struct FilesystemError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl FilesystemError {
    pub fn new(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// The external runner could not be started or checked
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Runner binary '{name}' not found: {source}")]
    RunnerNotFound {
        name: String,
        #[source]
        source: which::Error,
    },

    #[error("Failed to run command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Config {} rejected by runner: {detail}", .config.display())]
    Preflight { config: PathBuf, detail: String },
}
