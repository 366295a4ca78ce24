// ABOUTME: Error types for the CLI host's own persistence and probing
// ABOUTME: Driver failures pass through unchanged as DriverError

use dockbox_driver::DriverError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read state file {path}: {source}")]
    StateRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt state file {path}: {source}")]
    StateFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    StateWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Sandbox {0} has not been created")]
    NotCreated(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

pub type Result<T> = std::result::Result<T, CliError>;
