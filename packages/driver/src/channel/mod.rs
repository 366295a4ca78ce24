// ABOUTME: Engine access abstraction shared by the CLI subprocess and native API implementations
// ABOUTME: Both variants feed the same parsers and produce the same orchestration state

use crate::config::{ChannelKind, ResolvedConfig};
use crate::error::{DriverError, Result};
use crate::parser::PortMapping;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod runner;

pub use api::ApiChannel;
pub use cli::CliChannel;
pub use runner::{CommandOutput, CommandRunner, ShellRunner};

/// Captured result of a command run inside a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into `ExecutionFailure`
    pub fn into_result(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(DriverError::ExecutionFailure {
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Inputs for one image build
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub dockerfile: String,
    /// Local directory sent as the build root, if any
    pub root: Option<PathBuf>,
}

/// Operations the lifecycle driver needs from a container engine
#[async_trait]
pub trait ExecutionChannel: Send + Sync {
    /// Fails with `EngineUnavailable` when the engine cannot be reached
    async fn verify(&self) -> Result<()>;

    /// Build an image and return its id
    async fn build_image(&self, context: &BuildContext) -> Result<String>;

    /// Start a container and return its id
    async fn run_container(&self, image_id: &str, transport_port: Option<u16>) -> Result<String>;

    /// Liveness check; any failure counts as "does not exist"
    async fn container_exists(&self, container_id: &str) -> bool;

    async fn container_ip(&self, container_id: &str) -> Result<String>;

    /// Host endpoint published for a container port
    async fn container_port(&self, container_id: &str, port: u16) -> Result<PortMapping>;

    /// Stop without a grace period
    async fn stop_container(&self, container_id: &str) -> Result<()>;

    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Existence check; any failure counts as "does not exist"
    async fn image_exists(&self, image_id: &str) -> bool;

    /// Whether any container, running or not, still references the image
    async fn image_in_use(&self, image_id: &str) -> Result<bool>;

    async fn remove_image(&self, image_id: &str) -> Result<()>;

    /// Run a command in the container. Non-zero exits are returned, not raised.
    async fn exec(&self, container_id: &str, command: &str) -> Result<ExecOutput>;

    async fn copy_to_container(&self, container_id: &str, local: &Path, remote: &str)
        -> Result<()>;
}

/// Channel selected by the `channel` option
pub fn connect(config: Arc<ResolvedConfig>) -> Result<Arc<dyn ExecutionChannel>> {
    match config.options.channel {
        ChannelKind::Cli => Ok(Arc::new(CliChannel::new(config))),
        ChannelKind::Api => Ok(Arc::new(ApiChannel::connect(config)?)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use mockall::mock;

    mock! {
        pub Channel {}

        #[async_trait::async_trait]
        impl ExecutionChannel for Channel {
            async fn verify(&self) -> Result<()>;
            async fn build_image(&self, context: &BuildContext) -> Result<String>;
            async fn run_container(&self, image_id: &str, transport_port: Option<u16>) -> Result<String>;
            async fn container_exists(&self, container_id: &str) -> bool;
            async fn container_ip(&self, container_id: &str) -> Result<String>;
            async fn container_port(&self, container_id: &str, port: u16) -> Result<PortMapping>;
            async fn stop_container(&self, container_id: &str) -> Result<()>;
            async fn remove_container(&self, container_id: &str) -> Result<()>;
            async fn image_exists(&self, image_id: &str) -> bool;
            async fn image_in_use(&self, image_id: &str) -> Result<bool>;
            async fn remove_image(&self, image_id: &str) -> Result<()>;
            async fn exec(&self, container_id: &str, command: &str) -> Result<ExecOutput>;
            async fn copy_to_container(&self, container_id: &str, local: &Path, remote: &str) -> Result<()>;
        }
    }
}
