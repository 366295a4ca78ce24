// ABOUTME: CLI commands that create and destroy a sandbox
// ABOUTME: State is saved even when create fails part-way so a later run can resume or clean up

use anyhow::{Context, Result};
use colored::*;
use dockbox_cli::{Session, SessionOptions};

pub async fn handle_create(options: &SessionOptions) -> Result<()> {
    let session = Session::open(options).context("Failed to open sandbox session")?;
    let mut state = session.load_state()?;

    println!("🐋 Creating sandbox {}", session.instance().bold());
    let created = session.driver.create(&mut state).await;
    session
        .save_state(&state)
        .with_context(|| format!("Failed to record state for {}", session.instance()))?;
    created?;

    println!(
        "✅ Sandbox ready: container {} at {}:{}",
        state.container_id.as_deref().unwrap_or("-").green(),
        state.hostname.as_deref().unwrap_or("-"),
        state
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("📄 State file: {}", session.state_path().display());
    Ok(())
}

pub async fn handle_destroy(options: &SessionOptions) -> Result<()> {
    let session = Session::open(options).context("Failed to open sandbox session")?;
    let mut state = session.load_state()?;

    if state.container_id.is_none() && state.image_id.is_none() {
        println!("{} Nothing to destroy for {}", "ℹ".cyan(), session.instance());
        return session.remove_state().map_err(Into::into);
    }

    println!("🧹 Destroying sandbox {}", session.instance().bold());
    session.driver.destroy(&mut state).await?;
    session.remove_state()?;
    println!("✅ Sandbox {} destroyed", session.instance());
    Ok(())
}
