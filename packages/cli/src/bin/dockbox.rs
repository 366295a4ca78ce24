// ABOUTME: dockbox binary entry point: global flags, logging setup and subcommand dispatch
// ABOUTME: Each subcommand opens a session for one sandbox instance and reports errors in colour

use clap::{Parser, Subcommand};
use colored::*;
use dockbox_cli::SessionOptions;
use dockbox_config::constants;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::inspect::{handle_dockerfile, handle_runner_options, handle_verify};
use cli::lifecycle::{handle_create, handle_destroy};
use cli::remote::{handle_exec, handle_login, handle_upload};

#[derive(Parser)]
#[command(name = "dockbox")]
#[command(about = "Disposable container sandboxes for test runs")]
#[command(version)]
struct Cli {
    /// Path to the JSON driver configuration (default: $DOCKBOX_CONFIG or ./dockbox.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Sandbox instance name, used for the state file
    #[arg(long, global = true, default_value = constants::DEFAULT_INSTANCE)]
    instance: String,

    /// Platform name such as ubuntu-22.04, centos-7 or windows-2019
    #[arg(long, global = true, default_value = constants::DEFAULT_PLATFORM_NAME)]
    platform: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the image and start the sandbox
    Create,
    /// Stop and remove the sandbox
    Destroy,
    /// Run a command inside the sandbox
    Exec {
        /// Command line to run
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Copy local files into the sandbox
    Upload {
        /// Local files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Destination directory inside the sandbox
        #[arg(long, short)]
        remote: String,
    },
    /// Open an interactive shell in the sandbox
    Login,
    /// Print the generated Dockerfile
    Dockerfile,
    /// Check that the container engine is reachable
    Verify,
    /// Print connection options for an external verifier
    RunnerOptions,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(constants::DOCKBOX_LOG)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let options = SessionOptions {
        config_path: cli.config,
        instance: cli.instance,
        platform: cli.platform,
    };

    if let Err(e) = handle_command(cli.command, &options).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands, options: &SessionOptions) -> anyhow::Result<()> {
    match command {
        Commands::Create => handle_create(options).await,
        Commands::Destroy => handle_destroy(options).await,
        Commands::Exec { command } => handle_exec(options, &command.join(" ")).await,
        Commands::Upload { paths, remote } => handle_upload(options, &paths, &remote).await,
        Commands::Login => handle_login(options).await,
        Commands::Dockerfile => handle_dockerfile(options),
        Commands::Verify => handle_verify(options).await,
        Commands::RunnerOptions => handle_runner_options(options),
    }
}
