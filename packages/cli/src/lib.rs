// ABOUTME: Host-side plumbing for the dockbox CLI: sessions, state files and readiness probing
// ABOUTME: The binary in src/bin maps subcommands onto these pieces and the driver

pub mod error;
pub mod readiness;
pub mod session;
pub mod state_store;

pub use error::{CliError, Result};
pub use readiness::TcpReadinessCheck;
pub use session::{Session, SessionOptions};
pub use state_store::StateStore;
