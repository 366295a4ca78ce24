// ABOUTME: Execution channel that drives the engine binary as a subprocess
// ABOUTME: Formats command lines with the command builder and recovers results with the text parsers

use super::{BuildContext, CommandOutput, CommandRunner, ExecOutput, ExecutionChannel, ShellRunner};
use crate::command;
use crate::config::ResolvedConfig;
use crate::error::{DriverError, Result};
use crate::parser::{self, ImageIdParser, PortMapping};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const INSTALL_HINT: &str =
    "You must first install the Docker CLI tool https://www.docker.com/get-started";

/// Shell exit codes for an unknown command (`sh` and `cmd`)
const COMMAND_NOT_FOUND: [i32; 2] = [127, 9009];

pub struct CliChannel {
    config: Arc<ResolvedConfig>,
    runner: Arc<dyn CommandRunner>,
    image_ids: ImageIdParser,
}

impl CliChannel {
    pub fn new(config: Arc<ResolvedConfig>) -> Self {
        Self::with_runner(config, Arc::new(ShellRunner))
    }

    pub fn with_runner(config: Arc<ResolvedConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            image_ids: ImageIdParser::default(),
        }
    }

    pub fn with_image_id_parser(mut self, parser: ImageIdParser) -> Self {
        self.image_ids = parser;
        self
    }

    /// Run one engine subcommand; a non-zero exit is an engine failure
    async fn docker(
        &self,
        operation: &str,
        subcommand: &str,
        input: Option<&str>,
    ) -> Result<CommandOutput> {
        let line = command::engine_command(&self.config, subcommand);
        debug!("docker_command: {}", line);

        let output = self
            .runner
            .run(&line, input)
            .await
            .map_err(|e| e.context(operation))?;
        if !output.success() {
            return Err(DriverError::engine(
                operation,
                format!("exit status {}: {}", output.status, output.stderr.trim()),
            ));
        }
        Ok(output)
    }

    fn dockerfile_dir(&self) -> Result<PathBuf> {
        match &self.config.options.build_tempdir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(dir.clone())
            }
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Relative to the working directory when the engine reads a local build root
    fn dockerfile_arg(&self, path: &Path) -> PathBuf {
        if self.config.build_context {
            if let Ok(cwd) = std::env::current_dir() {
                if let Ok(relative) = path.strip_prefix(&cwd) {
                    return relative.to_path_buf();
                }
            }
        }
        path.to_path_buf()
    }
}

#[async_trait]
impl ExecutionChannel for CliChannel {
    async fn verify(&self) -> Result<()> {
        let line = command::engine_command(&self.config, "version");
        debug!("docker_command: {}", line);

        let output = self.runner.run(&line, None).await.map_err(|e| {
            DriverError::EngineUnavailable(format!("{} ({})", INSTALL_HINT, e))
        })?;
        if output.success() {
            return Ok(());
        }
        if COMMAND_NOT_FOUND.contains(&output.status) {
            return Err(DriverError::EngineUnavailable(format!(
                "{} (exit status {}: {})",
                INSTALL_HINT,
                output.status,
                output.stderr.trim()
            )));
        }
        Err(DriverError::EngineUnavailable(format!(
            "Cannot reach the container engine at {} (exit status {}: {})",
            self.config.socket,
            output.status,
            output.stderr.trim()
        )))
    }

    async fn build_image(&self, context: &BuildContext) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("Dockerfile-dockbox")
            .tempfile_in(self.dockerfile_dir()?)?;
        file.write_all(context.dockerfile.as_bytes())?;
        file.flush()?;

        let cmd = command::build_command(&self.config, &self.dockerfile_arg(file.path()));
        // Without a build context the engine reads the Dockerfile from stdin
        let input = (!self.config.build_context).then_some(context.dockerfile.as_str());
        let output = self.docker("build image", &cmd, input).await?;

        // BuildKit reports progress, including the image digest, on stderr
        self.image_ids
            .parse(&output.combined())
            .map_err(|e| e.context("build image"))
    }

    async fn run_container(&self, image_id: &str, transport_port: Option<u16>) -> Result<String> {
        let cmd = command::run_command(&self.config, image_id, transport_port)?;
        let output = self.docker("run container", &cmd, None).await?;
        parser::parse_container_id(&output.stdout).map_err(|e| e.context("run container"))
    }

    async fn container_exists(&self, container_id: &str) -> bool {
        self.docker("inspect container", &format!("top {}", container_id), None)
            .await
            .is_ok()
    }

    async fn container_ip(&self, container_id: &str) -> Result<String> {
        let cmd = format!(
            "inspect --format '{{{{ .NetworkSettings.IPAddress }}}}' {}",
            container_id
        );
        let output = self.docker("inspect container", &cmd, None).await.map_err(|e| {
            DriverError::engine(
                "resolve container address",
                format!("Error getting internal IP of container: {}", e),
            )
        })?;
        Ok(output.stdout.trim().to_string())
    }

    async fn container_port(&self, container_id: &str, port: u16) -> Result<PortMapping> {
        let cmd = format!("port {} {}/tcp", container_id, port);
        let output = self
            .docker("resolve port", &cmd, None)
            .await
            .map_err(|e| DriverError::parse("Container has no SSH port mapped", &e.to_string()))?;
        parser::parse_port_mapping(&output.stdout)
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.docker("stop container", &format!("stop -t 0 {}", container_id), None)
            .await
            .map(|_| ())
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        self.docker("remove container", &format!("rm {}", container_id), None)
            .await
            .map(|_| ())
    }

    async fn image_exists(&self, image_id: &str) -> bool {
        self.docker(
            "inspect image",
            &format!("inspect --type=image {}", image_id),
            None,
        )
        .await
        .is_ok()
    }

    async fn image_in_use(&self, image_id: &str) -> Result<bool> {
        let output = self.docker("list containers", "ps -a", None).await?;
        Ok(parser::image_referenced(&output.stdout, image_id))
    }

    async fn remove_image(&self, image_id: &str) -> Result<()> {
        self.docker("remove image", &format!("rmi {}", image_id), None)
            .await
            .map(|_| ())
    }

    async fn exec(&self, container_id: &str, command: &str) -> Result<ExecOutput> {
        let cmd = command::exec_command(&self.config, container_id, command)?;
        let line = command::engine_command(&self.config, &cmd);
        debug!("docker_command: {}", line);

        let output = self
            .runner
            .run(&line, None)
            .await
            .map_err(|e| e.context("execute command on container"))?;
        Ok(ExecOutput {
            exit_code: output.status as i64,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn copy_to_container(
        &self,
        container_id: &str,
        local: &Path,
        remote: &str,
    ) -> Result<()> {
        let cmd = command::copy_command(
            &local.to_string_lossy(),
            &format!("{}:{}", container_id, remote),
            false,
        );
        self.docker(&format!("copy {}", local.display()), &cmd, None)
            .await
            .map(|_| ())
    }
}
