// ABOUTME: Platform-independent container operations and the per-platform capability interface
// ABOUTME: Linux and Windows implementations are picked from a table keyed by platform kind

use crate::channel::{BuildContext, ExecOutput, ExecutionChannel};
use crate::command;
use crate::config::{PlatformKind, ResolvedConfig};
use crate::error::{DriverError, Result};
use crate::keys::KeyProvisioner;
use crate::parser;
use crate::state::OrchestrationState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod linux;
pub mod windows;

pub use linux::LinuxContainer;
pub use windows::WindowsContainer;

/// What differs between Linux and Windows sandboxes
#[async_trait]
pub trait ContainerPlatform: Send + Sync {
    /// Build and start the sandbox, filling in the state as each step completes
    async fn create(&self, state: &mut OrchestrationState) -> Result<()>;

    /// Upload `command` as a script and run it with the platform interpreter
    async fn execute(&self, state: &OrchestrationState, command: &str) -> Result<ExecOutput>;

    /// Image definition for this platform
    fn dockerfile(&self) -> Result<String>;
}

type PlatformFactory = fn(Arc<Container>, KeyProvisioner) -> Box<dyn ContainerPlatform>;

const PLATFORMS: &[(PlatformKind, PlatformFactory)] = &[
    (PlatformKind::Linux, linux_platform),
    (PlatformKind::Windows, windows_platform),
];

fn linux_platform(container: Arc<Container>, keys: KeyProvisioner) -> Box<dyn ContainerPlatform> {
    Box::new(LinuxContainer::new(container, keys))
}

fn windows_platform(container: Arc<Container>, _: KeyProvisioner) -> Box<dyn ContainerPlatform> {
    Box::new(WindowsContainer::new(container))
}

pub fn select(
    kind: PlatformKind,
    container: Arc<Container>,
    keys: KeyProvisioner,
) -> Result<Box<dyn ContainerPlatform>> {
    PLATFORMS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, factory)| factory(container, keys))
        .ok_or_else(|| DriverError::Configuration(format!("No implementation for {:?}", kind)))
}

/// Operations shared by every platform
pub struct Container {
    pub config: Arc<ResolvedConfig>,
    pub channel: Arc<dyn ExecutionChannel>,
}

impl Container {
    pub fn new(config: Arc<ResolvedConfig>, channel: Arc<dyn ExecutionChannel>) -> Self {
        Self { config, channel }
    }

    fn is_windows(&self) -> bool {
        self.config.kind == PlatformKind::Windows
    }

    /// Common start of `create`: a recorded container must still be alive
    pub async fn check_existing(&self, state: &mut OrchestrationState) -> Result<()> {
        if let Some(id) = &state.container_id {
            if self.channel.container_exists(id).await {
                info!("Container ID {} already exists.", id);
            } else {
                return Err(DriverError::InconsistentState(format!(
                    "Container ID {} was found in the state data, but the container does not exist.",
                    id
                )));
            }
        }

        state.username = self.config.username.clone();
        Ok(())
    }

    pub async fn build_image(&self, dockerfile: String) -> Result<String> {
        let root = if self.config.build_context {
            Some(std::env::current_dir()?)
        } else {
            None
        };
        let image_id = self
            .channel
            .build_image(&BuildContext { dockerfile, root })
            .await?;
        info!("Built image {}", image_id);
        Ok(image_id)
    }

    /// Remote socket host, internal container address or `localhost`
    pub async fn hostname(&self, container_id: &str) -> Result<String> {
        if self.config.remote_socket() {
            self.config.socket_host().ok_or_else(|| {
                DriverError::Configuration(format!(
                    "Cannot determine host of socket {}",
                    self.config.socket
                ))
            })
        } else if self.config.options.use_internal_docker_network {
            self.channel.container_ip(container_id).await
        } else {
            Ok("localhost".to_string())
        }
    }

    /// Run a command and fail on a non-zero exit
    pub async fn exec(&self, container_id: &str, command: &str) -> Result<ExecOutput> {
        self.channel
            .exec(container_id, command)
            .await
            .map_err(|e| e.context("execute command on container"))?
            .into_result()
    }

    /// The container's live environment
    pub async fn env_variables(&self, container_id: &str) -> Result<HashMap<String, String>> {
        if self.is_windows() {
            let cmd = command::powershell_command(
                "-Command [System.Environment]::GetEnvironmentVariables() ^| ConvertTo-Json",
            );
            let output = self.exec(container_id, &cmd).await?;
            parser::parse_env_json(&output.stdout)
        } else {
            let output = self.exec(container_id, "printenv").await?;
            Ok(parser::parse_env_listing(output.stdout.trim()))
        }
    }

    /// Resolve `$NAME` / `$env:NAME` against the container environment
    pub async fn replace_env_variables(&self, container_id: &str, path: &str) -> Result<String> {
        if parser::env_placeholder(path).is_none() {
            return Ok(path.to_string());
        }
        let vars = self.env_variables(container_id).await?;
        Ok(parser::substitute_env(path, &vars))
    }

    pub async fn create_dir(&self, container_id: &str, path: &str) -> Result<()> {
        let path = self.replace_env_variables(container_id, path).await?;
        let cmd = if self.is_windows() {
            command::powershell_command(&format!(
                "-Command if(-not (Test-Path '{path}')) {{ New-Item -ItemType Directory -Path '{path}' -Force }}",
                path = path
            ))
        } else {
            format!("mkdir -p {}", path)
        };
        self.exec(container_id, &cmd)
            .await
            .map(|_| ())
            .map_err(|e| e.context(format!("create directory {} on container", path)))
    }

    /// Copy each local path into `remote`, in order
    pub async fn upload(&self, container_id: &str, locals: &[PathBuf], remote: &str) -> Result<()> {
        let remote = self.replace_env_variables(container_id, remote).await?;
        for local in locals {
            debug!("Copying local file {} to {} on container", local.display(), remote);
            self.channel
                .copy_to_container(container_id, local, &remote)
                .await?;
        }
        Ok(())
    }

    /// Write a script under `<state_dir>/temp`
    pub fn write_temp_script(&self, filename: &str, command: &str) -> Result<PathBuf> {
        let dir = self.config.options.state_dir.join("temp");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        std::fs::write(&path, command)?;
        Ok(path)
    }

    /// Upload a local script into `remote_dir`, removing the local copy afterwards
    pub async fn upload_script(
        &self,
        container_id: &str,
        script: &Path,
        remote_dir: &str,
    ) -> Result<()> {
        let uploaded = match self.create_dir(container_id, remote_dir).await {
            Ok(()) => {
                debug!("Uploading temp file {} to {} on container", script.display(), remote_dir);
                self.upload(container_id, &[script.to_path_buf()], remote_dir)
                    .await
            }
            Err(e) => Err(e),
        };

        debug!("Deleting temp file from local filesystem");
        let removed = std::fs::remove_file(script);
        match (uploaded, removed) {
            (Err(e), Err(cleanup)) => {
                warn!("Failed to delete temp file {}: {}", script.display(), cleanup);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), removed) => removed.map_err(DriverError::from),
        }
    }

    /// Stop and remove a live container, then the image when requested and unused
    pub async fn destroy(&self, state: &OrchestrationState) -> Result<()> {
        if let Some(id) = &state.container_id {
            info!("Destroying container {}", id);
            if self.channel.container_exists(id).await {
                self.channel.stop_container(id).await?;
                self.channel.remove_container(id).await?;
            } else {
                debug!("Container {} is not running, nothing to remove", id);
            }
        }

        if self.config.options.remove_images {
            if let Some(image_id) = &state.image_id {
                if self.channel.image_exists(image_id).await {
                    if self.channel.image_in_use(image_id).await? {
                        info!("Image ID {} is in use. Skipping removal", image_id);
                    } else {
                        info!("Removing image with Image ID {}.", image_id);
                        self.channel.remove_image(image_id).await?;
                    }
                }
            }
        }

        Ok(())
    }
}
