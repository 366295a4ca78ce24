// ABOUTME: Wires config file, resolved options, execution channel and state store for one instance
// ABOUTME: Each CLI invocation opens one session and persists state after every lifecycle step

use crate::error::{CliError, Result};
use crate::readiness::TcpReadinessCheck;
use crate::state_store::StateStore;
use dockbox_config::constants;
use dockbox_driver::{
    channel, new_key_lock, Driver, DriverConfig, Instance, KeyProvisioner, OrchestrationState,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub config_path: Option<PathBuf>,
    pub instance: String,
    pub platform: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            instance: constants::DEFAULT_INSTANCE.to_string(),
            platform: constants::DEFAULT_PLATFORM_NAME.to_string(),
        }
    }
}

pub struct Session {
    pub driver: Driver,
    store: StateStore,
    instance: String,
}

impl Session {
    pub fn open(options: &SessionOptions) -> Result<Self> {
        let config = load_config(options.config_path.as_deref())?;
        let store = StateStore::new(config.state_dir.clone());

        let resolved = Arc::new(config.resolve(&Instance {
            name: options.instance.clone(),
            platform_name: options.platform.clone(),
        })?);
        debug!(
            "Resolved {} ({}) with image {}",
            options.instance, resolved.platform, resolved.image
        );

        let channel = channel::connect(resolved.clone())?;
        let driver = Driver::new(resolved, channel, KeyProvisioner::new(new_key_lock()))?
            .with_readiness_check(Arc::new(TcpReadinessCheck::default()));

        Ok(Self {
            driver,
            store,
            instance: options.instance.clone(),
        })
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn state_path(&self) -> PathBuf {
        self.store.path(&self.instance)
    }

    pub fn load_state(&self) -> Result<OrchestrationState> {
        self.store.load(&self.instance)
    }

    /// State of a sandbox that must already exist
    pub fn require_state(&self) -> Result<OrchestrationState> {
        let state = self.load_state()?;
        if state.container_id.is_none() {
            return Err(CliError::NotCreated(self.instance.clone()));
        }
        Ok(state)
    }

    pub fn save_state(&self, state: &OrchestrationState) -> Result<()> {
        self.store.save(&self.instance, state)
    }

    pub fn remove_state(&self) -> Result<()> {
        self.store.remove(&self.instance)
    }
}

/// Explicit path, then `DOCKBOX_CONFIG`, then `./dockbox.json` when present, else defaults
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(constants::DOCKBOX_CONFIG) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let local = PathBuf::from(constants::DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}

pub fn load_config(explicit: Option<&Path>) -> Result<DriverConfig> {
    match config_path(explicit) {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            Ok(DriverConfig::load(&path)?)
        }
        None => Ok(DriverConfig::default()),
    }
}
