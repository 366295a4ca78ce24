// ABOUTME: Read-only CLI commands: engine check, Dockerfile preview and verifier options
// ABOUTME: None of these change the sandbox or its state file

use anyhow::{Context, Result};
use colored::*;
use dockbox_cli::{Session, SessionOptions};
use dockbox_driver::{DockerRunnerOptions, RunnerOptions};

pub async fn handle_verify(options: &SessionOptions) -> Result<()> {
    let session = Session::open(options).context("Failed to open sandbox session")?;
    session.driver.verify_dependencies().await?;
    println!("{} Container engine reachable", "✅".green());
    Ok(())
}

pub fn handle_dockerfile(options: &SessionOptions) -> Result<()> {
    let session = Session::open(options).context("Failed to open sandbox session")?;
    let dockerfile = session
        .driver
        .dockerfile()
        .context("Failed to generate Dockerfile")?;
    print!("{}", dockerfile);
    Ok(())
}

pub fn handle_runner_options(options: &SessionOptions) -> Result<()> {
    let session = Session::open(options).context("Failed to open sandbox session")?;
    let state = session.require_state()?;
    let runner = DockerRunnerOptions.runner_options(&state)?;
    println!("{}", serde_json::to_string_pretty(&runner)?);
    Ok(())
}
