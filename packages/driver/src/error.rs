// ABOUTME: Error taxonomy for sandbox lifecycle operations
// ABOUTME: Wraps engine, parse and filesystem failures with the operation being attempted

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    /// Unknown platform, malformed option value or unusable template.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Engine output did not match any known format.
    #[error("Parse error: {message}")]
    Parse { message: String, output: String },

    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A command run inside the sandbox exited non-zero.
    #[error("Command exited with status {exit_code}: {stderr}")]
    ExecutionFailure {
        exit_code: i64,
        stdout: String,
        stderr: String,
    },

    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    /// An engine call (subprocess or API) failed.
    #[error("{operation} failed: {message}")]
    Engine { operation: String, message: String },

    #[error("Key generation error: {0}")]
    Key(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    pub(crate) fn parse(message: impl Into<String>, output: &str) -> Self {
        DriverError::Parse {
            message: message.into(),
            output: output.to_string(),
        }
    }

    pub(crate) fn engine(operation: impl Into<String>, message: impl ToString) -> Self {
        DriverError::Engine {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Prefix the error with what was being attempted, keeping its kind.
    pub(crate) fn context(self, operation: impl Into<String>) -> Self {
        let operation = operation.into();
        match self {
            DriverError::Engine {
                operation: inner,
                message,
            } => DriverError::Engine {
                operation: operation.clone(),
                message: format!("{} failed: {}", inner, message),
            },
            DriverError::Parse { message, output } => DriverError::Parse {
                message: format!("{}: {}", operation, message),
                output,
            },
            DriverError::Io(e) => DriverError::Engine {
                operation,
                message: e.to_string(),
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
