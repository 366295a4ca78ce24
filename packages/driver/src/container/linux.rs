// ABOUTME: Linux sandboxes: SSH-reachable containers built from a platform recipe
// ABOUTME: Commands are uploaded as shell scripts and run with /bin/bash

use super::{Container, ContainerPlatform};
use crate::channel::ExecOutput;
use crate::dockerfile;
use crate::error::Result;
use crate::keys::{self, KeyProvisioner};
use crate::state::OrchestrationState;
use async_trait::async_trait;
use dockbox_config::constants::SSH_PORT;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct LinuxContainer {
    container: Arc<Container>,
    keys: KeyProvisioner,
}

impl LinuxContainer {
    pub fn new(container: Arc<Container>, keys: KeyProvisioner) -> Self {
        Self { container, keys }
    }

    async fn ssh_port(&self, container_id: &str) -> Result<u16> {
        if self.container.config.options.use_internal_docker_network {
            return Ok(SSH_PORT);
        }
        let mapping = self
            .container
            .channel
            .container_port(container_id, SSH_PORT)
            .await?;
        Ok(mapping.port)
    }
}

#[async_trait]
impl ContainerPlatform for LinuxContainer {
    async fn create(&self, state: &mut OrchestrationState) -> Result<()> {
        self.container.check_existing(state).await?;

        debug!("Creating Linux container");
        let options = &self.container.config.options;
        self.keys
            .ensure_keypair(&options.private_key, &options.public_key)
            .await?;
        state.ssh_key_path = Some(options.private_key.clone());

        if state.image_id.is_none() {
            let image_id = self.container.build_image(self.dockerfile()?).await?;
            state.image_id = Some(image_id);
        }

        let container_id = match &state.container_id {
            Some(id) => id.clone(),
            None => {
                let image_id = state.image_id.as_deref().unwrap_or_default();
                let id = self
                    .container
                    .channel
                    .run_container(image_id, Some(SSH_PORT))
                    .await?;
                state.container_id = Some(id.clone());
                id
            }
        };

        state.hostname = Some(self.container.hostname(&container_id).await?);
        state.port = Some(self.ssh_port(&container_id).await?);
        Ok(())
    }

    async fn execute(&self, state: &OrchestrationState, command: &str) -> Result<ExecOutput> {
        let container_id = state.require_container("execute")?;
        debug!(
            "Executing command on Linux container (Platform: {})",
            self.container.config.platform
        );

        let filename = format!("docker-{}.sh", Uuid::new_v4());
        let script = self.container.write_temp_script(&filename, command)?;
        let remote_dir = self.container.config.temp_dir.clone();
        self.container
            .upload_script(container_id, &script, &remote_dir)
            .await
            .map_err(|e| e.context("execute command on Linux container"))?;

        let remote_dir = self
            .container
            .replace_env_variables(container_id, &remote_dir)
            .await?;
        debug!("Executing temp script {}/{} on container", remote_dir, filename);
        self.container
            .exec(container_id, &format!("/bin/bash {}/{}", remote_dir, filename))
            .await
    }

    fn dockerfile(&self) -> Result<String> {
        let config = &self.container.config;
        if config.options.dockerfile.is_some() {
            return dockerfile::linux(config, "");
        }
        let public_key = keys::read_public_key(&config.options.public_key)?;
        dockerfile::linux(config, &public_key)
    }
}
