// ABOUTME: CLI commands acting inside a running sandbox (exec, upload, login)
// ABOUTME: All of them require a previously created sandbox recorded in the state file

use anyhow::{Context, Result};
use dockbox_cli::{Session, SessionOptions};
use dockbox_driver::DriverError;
use std::path::PathBuf;
use tokio::process::Command;

pub async fn handle_exec(options: &SessionOptions, command: &str) -> Result<()> {
    let session = Session::open(options).context("Failed to open sandbox session")?;
    let state = session.require_state()?;

    match session.driver.execute(&state, command).await {
        Ok(Some(output)) => {
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(DriverError::ExecutionFailure {
            exit_code,
            stdout,
            stderr,
        }) => {
            print!("{}", stdout);
            eprint!("{}", stderr);
            anyhow::bail!("Command exited with status {}", exit_code)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn handle_upload(options: &SessionOptions, paths: &[PathBuf], remote: &str) -> Result<()> {
    let session = Session::open(options).context("Failed to open sandbox session")?;
    let state = session.require_state()?;

    for path in paths {
        if !path.exists() {
            anyhow::bail!("Local path {} does not exist", path.display());
        }
    }

    session.driver.upload(&state, paths, remote).await?;
    println!("✅ Uploaded {} path(s) to {}", paths.len(), remote);
    Ok(())
}

pub async fn handle_login(options: &SessionOptions) -> Result<()> {
    let session = Session::open(options).context("Failed to open sandbox session")?;
    let state = session.require_state()?;
    let line = session.driver.login_command(&state)?;

    let status = if cfg!(windows) {
        Command::new("cmd").arg("/C").arg(&line).status().await
    } else {
        Command::new("sh").arg("-c").arg(&line).status().await
    }
    .context("Failed to start interactive shell")?;

    if !status.success() {
        anyhow::bail!("Login shell exited with status {:?}", status.code());
    }
    Ok(())
}
