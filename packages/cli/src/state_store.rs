// ABOUTME: JSON persistence of orchestration state, one file per sandbox instance
// ABOUTME: A missing file means the sandbox is absent; destroy removes the file

use crate::error::{CliError, Result};
use dockbox_driver::OrchestrationState;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<state_dir>/<instance>.json`
    pub fn path(&self, instance: &str) -> PathBuf {
        self.dir.join(format!("{}.json", instance))
    }

    pub fn load(&self, instance: &str) -> Result<OrchestrationState> {
        let path = self.path(instance);
        if !path.exists() {
            return Ok(OrchestrationState::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| CliError::StateRead {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CliError::StateFormat { path, source })
    }

    pub fn save(&self, instance: &str, state: &OrchestrationState) -> Result<()> {
        let path = self.path(instance);
        debug!("Saving state to {}", path.display());
        write_json(&path, state).map_err(|source| CliError::StateWrite { path, source })
    }

    pub fn remove(&self, instance: &str) -> Result<()> {
        let path = self.path(instance);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CliError::StateWrite { path, source }),
        }
    }
}

fn write_json(path: &Path, state: &OrchestrationState) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)
}
