// ABOUTME: Windows sandboxes: no SSH, commands run through PowerShell via the engine's exec
// ABOUTME: Scripts are uploaded as .ps1 files into the container temp directory

use super::{Container, ContainerPlatform};
use crate::channel::ExecOutput;
use crate::command;
use crate::dockerfile;
use crate::error::Result;
use crate::state::OrchestrationState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct WindowsContainer {
    container: Arc<Container>,
}

impl WindowsContainer {
    pub fn new(container: Arc<Container>) -> Self {
        Self { container }
    }
}

#[async_trait]
impl ContainerPlatform for WindowsContainer {
    async fn create(&self, state: &mut OrchestrationState) -> Result<()> {
        self.container.check_existing(state).await?;

        debug!("Creating Windows container");
        if state.image_id.is_none() {
            let image_id = self.container.build_image(self.dockerfile()?).await?;
            state.image_id = Some(image_id);
        }

        let container_id = match &state.container_id {
            Some(id) => id.clone(),
            None => {
                let image_id = state.image_id.as_deref().unwrap_or_default();
                let id = self.container.channel.run_container(image_id, None).await?;
                state.container_id = Some(id.clone());
                id
            }
        };

        state.hostname = Some(self.container.hostname(&container_id).await?);
        Ok(())
    }

    async fn execute(&self, state: &OrchestrationState, command: &str) -> Result<ExecOutput> {
        let container_id = state.require_container("execute")?;
        debug!("Executing command on Windows container");

        let filename = format!("docker-{}.ps1", Uuid::new_v4());
        let script = self.container.write_temp_script(&filename, command)?;
        let remote_dir = self.container.config.temp_dir.replace('/', "\\");
        self.container
            .upload_script(container_id, &script, &remote_dir)
            .await
            .map_err(|e| e.context("execute command on Windows container"))?;

        let remote_dir = self
            .container
            .replace_env_variables(container_id, &remote_dir)
            .await?;
        debug!("Executing temp script {}\\{} on container", remote_dir, filename);
        let cmd = command::powershell_command(&format!("-File {}\\{}", remote_dir, filename));
        self.container.exec(container_id, &cmd).await
    }

    fn dockerfile(&self) -> Result<String> {
        dockerfile::windows(&self.container.config)
    }
}
