// ABOUTME: Subprocess execution seam used by the CLI channel
// ABOUTME: The default runner hands the full command line to the host shell via tokio::process

use crate::error::Result;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a complete command line, feeding `input` on stdin when given
    async fn run(&self, command: &str, input: Option<&str>) -> Result<CommandOutput>;
}

/// Runs commands through `sh -c` (`cmd /C` on Windows hosts)
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    fn shell(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, input: Option<&str>) -> Result<CommandOutput> {
        debug!("Running: {}", command);

        let mut cmd = Self::shell(command);
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        let result = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("Exit status {}", result.status);
        Ok(result)
    }
}
