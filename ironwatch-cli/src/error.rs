//! CLI-specific error types and exit code mapping

use ironwatch_core::error::IronwatchError;
use ironwatch_log_pipeline::LogPipelineError;
use ironwatch_storage::StoreError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to stable process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage could not be opened or queried.
    #[error("storage error: {0}")]
    Storage(String),

    /// Rule file or rule spec problem.
    #[error("rule error: {0}")]
    Rule(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                  |
    /// |------|--------------------------|
    /// | 0    | Success                  |
    /// | 1    | General / command error  |
    /// | 3    | Configuration error      |
    /// | 4    | Storage error            |
    /// | 5    | Rule error               |
    /// | 6    | IO error                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 3,
            Self::Storage(_) => 4,
            Self::Rule(_) => 5,
            Self::Io(_) => 6,
            Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

impl From<IronwatchError> for CliError {
    fn from(e: IronwatchError) -> Self {
        match e {
            IronwatchError::Config(inner) => Self::Config(inner.to_string()),
            IronwatchError::Storage(inner) => Self::Storage(inner.to_string()),
            IronwatchError::Detection(inner) => Self::Rule(inner.to_string()),
            IronwatchError::Io(inner) => Self::Io(inner),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<LogPipelineError> for CliError {
    fn from(e: LogPipelineError) -> Self {
        match e {
            LogPipelineError::RuleLoad { .. } | LogPipelineError::RuleSpec { .. } => {
                Self::Rule(e.to_string())
            }
            LogPipelineError::Storage(inner) => Self::Storage(inner.to_string()),
            LogPipelineError::Io(inner) => Self::Io(inner),
            LogPipelineError::Overflow { .. } => Self::Io(std::io::Error::other(e.to_string())),
            LogPipelineError::Config { .. } => Self::Config(e.to_string()),
            other => Self::Command(other.to_string()),
        }
    }
}
