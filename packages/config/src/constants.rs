// ABOUTME: Environment variable name constants and default paths
// ABOUTME: Centralized definitions of all environment variable names used across dockbox

// Container engine connection
pub const DOCKER_HOST: &str = "DOCKER_HOST";
pub const DEFAULT_UNIX_SOCKET: &str = "unix:///var/run/docker.sock";
pub const DEFAULT_NPIPE_SOCKET: &str = "npipe:////./pipe/docker_engine";

// Logging
pub const DOCKBOX_LOG: &str = "DOCKBOX_LOG";

// Terminal geometry forwarded into interactive sessions
pub const COLUMNS: &str = "COLUMNS";
pub const LINES: &str = "LINES";
pub const DEFAULT_COLUMNS: u16 = 80;
pub const DEFAULT_LINES: u16 = 24;

// Identity used when deriving instance names
pub const USER: &str = "USER";
pub const USERNAME: &str = "USERNAME"; // Windows

// Local working directory for keys, temp scripts and state files
pub const DEFAULT_STATE_DIR: &str = ".dockbox";
pub const DEFAULT_PRIVATE_KEY: &str = ".dockbox/docker_id_rsa";
pub const DEFAULT_PUBLIC_KEY: &str = ".dockbox/docker_id_rsa.pub";

// Transport port the Linux sandbox image exposes for SSH
pub const SSH_PORT: u16 = 22;

// CLI host
pub const DOCKBOX_CONFIG: &str = "DOCKBOX_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "dockbox.json";
pub const DEFAULT_INSTANCE: &str = "default";
pub const DEFAULT_PLATFORM_NAME: &str = "ubuntu-22.04";
