// ABOUTME: Disposable container sandboxes for test runs: build, start, exec, upload and tear down
// ABOUTME: Engine access goes through the CLI binary or the native API, selected by configuration

pub mod channel;
pub mod command;
pub mod config;
pub mod container;
pub mod dockerfile;
pub mod driver;
pub mod error;
pub mod keys;
pub mod parser;
pub mod state;
pub mod verifier;

pub use channel::{
    connect, ApiChannel, BuildContext, CliChannel, CommandOutput, CommandRunner, ExecOutput,
    ExecutionChannel, ShellRunner,
};
pub use config::{ChannelKind, DriverConfig, Instance, Platform, PlatformKind, ResolvedConfig};
pub use container::ContainerPlatform;
pub use driver::{Driver, ReadinessCheck};
pub use error::{DriverError, Result};
pub use keys::{new_key_lock, KeyLock, KeyProvisioner};
pub use parser::{ImageIdParser, ImageIdPattern, PortMapping};
pub use state::{LifecycleStage, OrchestrationState};
pub use verifier::{DockerRunnerOptions, RunnerOptions};
