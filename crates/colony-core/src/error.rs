use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Crypto failure: {0}")]
    Crypto(String),

    #[error("Identity store error at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Approval failed: {0}")]
    Approval(String),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Invalid task parameter {key}={value:?}: {reason}")]
    TaskParameterInvalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Task execution failed: {0}")]
    Execution(String),

    #[error("Task execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Deregistration failed: {0}")]
    Deregistration(String),
}

impl WorkerError {
    /// Errors that must stop the current path before any further network call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::Configuration(_) | WorkerError::Crypto(_) | WorkerError::Persistence { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
