// ABOUTME: Lifecycle driver exposing create, destroy, execute and upload on orchestration state
// ABOUTME: Delegates platform-specific steps to the Linux or Windows implementation chosen at construction

use crate::channel::{ExecOutput, ExecutionChannel};
use crate::command;
use crate::config::ResolvedConfig;
use crate::container::{self, Container, ContainerPlatform};
use crate::error::Result;
use crate::keys::KeyProvisioner;
use crate::state::OrchestrationState;
use async_trait::async_trait;
use dockbox_config::constants;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Blocks until the sandbox accepts connections; the host owns the retry and timeout policy
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn wait_until_ready(&self, state: &OrchestrationState) -> Result<()>;
}

pub struct Driver {
    config: Arc<ResolvedConfig>,
    channel: Arc<dyn ExecutionChannel>,
    container: Arc<Container>,
    platform: Box<dyn ContainerPlatform>,
    readiness: Option<Arc<dyn ReadinessCheck>>,
}

impl Driver {
    pub fn new(
        config: Arc<ResolvedConfig>,
        channel: Arc<dyn ExecutionChannel>,
        keys: KeyProvisioner,
    ) -> Result<Self> {
        let container = Arc::new(Container::new(config.clone(), channel.clone()));
        let platform = container::select(config.kind, container.clone(), keys)?;
        Ok(Self {
            config,
            channel,
            container,
            platform,
            readiness: None,
        })
    }

    pub fn with_readiness_check(mut self, check: Arc<dyn ReadinessCheck>) -> Self {
        self.readiness = Some(check);
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub async fn verify_dependencies(&self) -> Result<()> {
        self.channel.verify().await
    }

    /// Bring the sandbox to the ready stage, skipping steps whose results are already recorded
    pub async fn create(&self, state: &mut OrchestrationState) -> Result<()> {
        info!("Creating sandbox {}", self.config.instance_name);
        self.platform.create(state).await?;

        if self.config.options.wait_for_transport {
            if let Some(check) = &self.readiness {
                check.wait_until_ready(state).await?;
            }
        }

        info!(
            "Sandbox {} ready at {}:{}",
            self.config.instance_name,
            state.hostname.as_deref().unwrap_or("unknown"),
            state
                .port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        Ok(())
    }

    /// Remove the container and, if requested, its image; the state is cleared afterwards
    pub async fn destroy(&self, state: &mut OrchestrationState) -> Result<()> {
        self.container.destroy(state).await?;
        state.clear();
        Ok(())
    }

    /// Run a command inside the sandbox. An empty command does nothing.
    pub async fn execute(
        &self,
        state: &OrchestrationState,
        command: &str,
    ) -> Result<Option<ExecOutput>> {
        if command.trim().is_empty() {
            return Ok(None);
        }
        self.platform.execute(state, command).await.map(Some)
    }

    pub async fn upload(
        &self,
        state: &OrchestrationState,
        locals: &[PathBuf],
        remote: &str,
    ) -> Result<()> {
        let container_id = state.require_container("upload")?;
        self.container.upload(container_id, locals, remote).await
    }

    /// Interactive shell command for the sandbox
    pub fn login_command(&self, state: &OrchestrationState) -> Result<String> {
        let container_id = state.require_container("login")?;
        let columns = std::env::var(constants::COLUMNS)
            .ok()
            .and_then(|c| c.parse::<u16>().ok())
            .unwrap_or(constants::DEFAULT_COLUMNS);
        let lines = std::env::var(constants::LINES)
            .ok()
            .and_then(|l| l.parse::<u16>().ok())
            .unwrap_or(constants::DEFAULT_LINES);

        Ok(command::engine_command(
            &self.config,
            &format!(
                "exec -e COLUMNS={} -e LINES={} -it {} /bin/sh -login -i",
                columns, lines, container_id
            ),
        ))
    }

    /// Image definition the next build would use
    pub fn dockerfile(&self) -> Result<String> {
        self.platform.dockerfile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::MockChannel;
    use crate::config::{DriverConfig, Instance};
    use crate::error::DriverError;
    use crate::keys::new_key_lock;
    use crate::parser::PortMapping;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn resolved(dir: &TempDir, config: DriverConfig, platform_name: &str) -> Arc<ResolvedConfig> {
        Arc::new(
            DriverConfig {
                socket: Some("unix:///var/run/docker.sock".to_string()),
                instance_name: Some("box".to_string()),
                private_key: dir.path().join("id_rsa"),
                public_key: dir.path().join("id_rsa.pub"),
                state_dir: dir.path().join("state"),
                build_context: Some(false),
                ..config
            }
            .resolve(&Instance {
                name: "suite".to_string(),
                platform_name: platform_name.to_string(),
            })
            .unwrap(),
        )
    }

    fn driver(config: Arc<ResolvedConfig>, channel: MockChannel) -> Driver {
        Driver::new(config, Arc::new(channel), KeyProvisioner::new(new_key_lock())).unwrap()
    }

    struct CountingCheck(AtomicUsize);

    #[async_trait]
    impl ReadinessCheck for CountingCheck {
        async fn wait_until_ready(&self, _state: &OrchestrationState) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_linux_create_populates_state() {
        let dir = TempDir::new().unwrap();
        let mut channel = MockChannel::new();
        channel
            .expect_build_image()
            .withf(|ctx| ctx.dockerfile.starts_with("FROM ubuntu:22.04\n") && ctx.root.is_none())
            .times(1)
            .returning(|_| Ok("abc123".to_string()));
        channel
            .expect_run_container()
            .withf(|image, port| image == "abc123" && *port == Some(22))
            .times(1)
            .returning(|_, _| Ok("0123456789ab".to_string()));
        channel.expect_container_port().returning(|_, _| {
            Ok(PortMapping {
                host: "0.0.0.0".to_string(),
                port: 32768,
            })
        });

        let check = Arc::new(CountingCheck(AtomicUsize::new(0)));
        let driver = driver(resolved(&dir, DriverConfig::default(), "ubuntu-22.04"), channel)
            .with_readiness_check(check.clone());

        let mut state = OrchestrationState::default();
        driver.create(&mut state).await.unwrap();

        assert_eq!(state.image_id.as_deref(), Some("abc123"));
        assert_eq!(state.container_id.as_deref(), Some("0123456789ab"));
        assert_eq!(state.hostname.as_deref(), Some("localhost"));
        assert_eq!(state.port, Some(32768));
        assert_eq!(state.username.as_deref(), Some("dockbox"));
        assert_eq!(state.ssh_key_path, Some(dir.path().join("id_rsa")));
        assert!(dir.path().join("id_rsa.pub").exists());
        assert_eq!(check.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_skips_recorded_steps() {
        let dir = TempDir::new().unwrap();
        let mut channel = MockChannel::new();
        channel.expect_container_exists().return_const(true);
        channel.expect_build_image().never();
        channel.expect_run_container().never();

        let config = resolved(
            &dir,
            DriverConfig {
                use_internal_docker_network: true,
                wait_for_transport: false,
                ..Default::default()
            },
            "ubuntu-22.04",
        );
        channel
            .expect_container_ip()
            .returning(|_| Ok("172.17.0.4".to_string()));
        let driver = driver(config, channel);

        let mut state = OrchestrationState {
            image_id: Some("abc123".to_string()),
            container_id: Some("0123456789ab".to_string()),
            ..Default::default()
        };
        driver.create(&mut state).await.unwrap();
        assert_eq!(state.hostname.as_deref(), Some("172.17.0.4"));
        assert_eq!(state.port, Some(22));
    }

    #[tokio::test]
    async fn test_create_with_dead_container_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        let mut channel = MockChannel::new();
        channel.expect_container_exists().return_const(false);
        channel.expect_build_image().never();

        let driver = driver(resolved(&dir, DriverConfig::default(), "ubuntu-22.04"), channel);
        let mut state = OrchestrationState {
            container_id: Some("0123456789ab".to_string()),
            ..Default::default()
        };
        let err = driver.create(&mut state).await.unwrap_err();
        assert!(matches!(err, DriverError::InconsistentState(_)));
    }

    #[tokio::test]
    async fn test_windows_create_has_no_keys_or_port() {
        let dir = TempDir::new().unwrap();
        let mut channel = MockChannel::new();
        channel
            .expect_build_image()
            .returning(|_| Ok("abc123".to_string()));
        channel
            .expect_run_container()
            .withf(|_, port| port.is_none())
            .returning(|_, _| Ok("0123456789ab".to_string()));
        channel.expect_container_port().never();

        let driver = driver(resolved(&dir, DriverConfig::default(), "windows-2019"), channel);
        let mut state = OrchestrationState::default();
        driver.create(&mut state).await.unwrap();

        assert_eq!(state.port, None);
        assert_eq!(state.ssh_key_path, None);
        assert!(!dir.path().join("id_rsa").exists());
    }

    #[tokio::test]
    async fn test_empty_command_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut channel = MockChannel::new();
        channel.expect_exec().never();

        let driver = driver(resolved(&dir, DriverConfig::default(), "ubuntu-22.04"), channel);
        let state = OrchestrationState {
            container_id: Some("0123456789ab".to_string()),
            ..Default::default()
        };
        assert_eq!(driver.execute(&state, "  ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_execute_uploads_script_and_reports_failure() {
        let dir = TempDir::new().unwrap();
        let mut channel = MockChannel::new();
        channel
            .expect_exec()
            .withf(|_, cmd| cmd == "mkdir -p /tmp")
            .returning(|_, _| Ok(ExecOutput::default()));
        channel
            .expect_copy_to_container()
            .withf(|_, local, remote| {
                remote == "/tmp"
                    && local.to_string_lossy().ends_with(".sh")
                    && std::fs::read_to_string(local).unwrap() == "exit 3"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        channel
            .expect_exec()
            .withf(|_, cmd| cmd.starts_with("/bin/bash /tmp/docker-"))
            .returning(|_, _| {
                Ok(ExecOutput {
                    exit_code: 3,
                    stdout: String::new(),
                    stderr: "failed".to_string(),
                })
            });

        let config = resolved(&dir, DriverConfig::default(), "ubuntu-22.04");
        let driver = driver(config, channel);
        let state = OrchestrationState {
            container_id: Some("0123456789ab".to_string()),
            ..Default::default()
        };

        let err = driver.execute(&state, "exit 3").await.unwrap_err();
        assert!(matches!(err, DriverError::ExecutionFailure { exit_code: 3, .. }));

        // Local script copy is removed after upload
        let leftovers = std::fs::read_dir(dir.path().join("state/temp")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_destroy_clears_state() {
        let dir = TempDir::new().unwrap();
        let mut channel = MockChannel::new();
        channel.expect_container_exists().return_const(true);
        channel.expect_stop_container().returning(|_| Ok(()));
        channel.expect_remove_container().returning(|_| Ok(()));

        let driver = driver(resolved(&dir, DriverConfig::default(), "ubuntu-22.04"), channel);
        let mut state = OrchestrationState {
            image_id: Some("abc123".to_string()),
            container_id: Some("0123456789ab".to_string()),
            hostname: Some("localhost".to_string()),
            port: Some(32768),
            ..Default::default()
        };
        driver.destroy(&mut state).await.unwrap();
        assert_eq!(state, OrchestrationState::default());
    }

    #[test]
    #[serial]
    fn test_login_command() {
        std::env::set_var(constants::COLUMNS, "120");
        std::env::remove_var(constants::LINES);

        let dir = TempDir::new().unwrap();
        let driver = driver(
            resolved(&dir, DriverConfig::default(), "ubuntu-22.04"),
            MockChannel::new(),
        );
        let state = OrchestrationState {
            container_id: Some("0123456789ab".to_string()),
            ..Default::default()
        };
        assert_eq!(
            driver.login_command(&state).unwrap(),
            "docker -H unix:///var/run/docker.sock exec -e COLUMNS=120 -e LINES=24 -it 0123456789ab /bin/sh -login -i"
        );
        std::env::remove_var(constants::COLUMNS);
    }
}
