// ABOUTME: Sandbox configuration options and their per-instance resolution
// ABOUTME: Computes derived defaults (image, platform, instance name, socket) once per sandbox

use crate::command;
use crate::error::{DriverError, Result};
use dockbox_config::constants;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which engine access mode performs the lifecycle calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Cli,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlatformKind {
    Linux,
    Windows,
}

impl PlatformKind {
    pub fn from_platform_name(name: &str) -> Self {
        if name.to_lowercase().contains("windows") {
            PlatformKind::Windows
        } else {
            PlatformKind::Linux
        }
    }
}

/// OS family of the sandbox image; each maps to one package/SSH recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Debian,
    Rhel,
    Fedora,
    Opensuse,
    Arch,
    Gentoo,
    GentooPaludis,
    CentosStream,
    AlmaLinux,
    RockyLinux,
    Photon,
    Windows,
}

impl Platform {
    pub fn kind(&self) -> PlatformKind {
        match self {
            Platform::Windows => PlatformKind::Windows,
            _ => PlatformKind::Linux,
        }
    }
}

impl FromStr for Platform {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "debian" | "ubuntu" => Ok(Platform::Debian),
            "rhel" | "centos" | "oraclelinux" | "amazonlinux" => Ok(Platform::Rhel),
            "fedora" => Ok(Platform::Fedora),
            "opensuse" | "opensuse/leap" | "opensuse/tumbleweed" | "sles" => {
                Ok(Platform::Opensuse)
            }
            "arch" => Ok(Platform::Arch),
            "gentoo" => Ok(Platform::Gentoo),
            "gentoo-paludis" => Ok(Platform::GentooPaludis),
            "centosstream" => Ok(Platform::CentosStream),
            "almalinux" => Ok(Platform::AlmaLinux),
            "rockylinux" => Ok(Platform::RockyLinux),
            "photon" => Ok(Platform::Photon),
            "windows" => Ok(Platform::Windows),
            _ => Err(DriverError::Configuration(format!(
                "Unknown platform '{}'",
                s
            ))),
        }
    }
}

/// Free-form engine options appended to `build` or `run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraOptions {
    Text(String),
    List(Vec<ExtraOptions>),
    Map(BTreeMap<String, serde_json::Value>),
}

/// Identity of the sandbox as seen by the host framework
#[derive(Debug, Clone)]
pub struct Instance {
    /// Suite/instance name, e.g. `default-ubuntu-2004`
    pub name: String,
    /// Platform name, e.g. `ubuntu-20.04`
    pub platform_name: String,
}

/// Raw options as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    // Engine connection
    pub binary: String,
    pub socket: Option<String>,
    pub tls: bool,
    pub tls_verify: bool,
    pub tls_cacert: Option<String>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub use_sudo: bool,
    pub channel: ChannelKind,
    /// Engine API version pinned by the API channel, e.g. "1.24"
    pub api_version: Option<String>,

    // Image
    pub image: Option<String>,
    pub platform: Option<String>,
    pub docker_platform: Option<String>,
    pub dockerfile: Option<PathBuf>,
    pub build_context: Option<bool>,
    pub build_options: Option<ExtraOptions>,
    pub build_tempdir: Option<PathBuf>,
    pub use_cache: bool,
    pub disable_upstart: bool,
    #[serde(deserialize_with = "string_or_list")]
    pub provision_command: Vec<String>,

    // Container
    pub instance_name: Option<String>,
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub run_command: Option<String>,
    pub run_options: Option<ExtraOptions>,
    pub env_variables: Option<serde_json::Value>,
    #[serde(deserialize_with = "string_or_list")]
    pub forward: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub dns: Vec<String>,
    pub add_host: BTreeMap<String, String>,
    #[serde(deserialize_with = "string_or_list")]
    pub volume: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub volumes_from: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub links: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub devices: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub cap_add: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub cap_drop: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub security_opt: Vec<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub memory: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub cpu: Option<String>,
    #[serde(deserialize_with = "scalar_string")]
    pub gpus: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
    pub privileged: bool,
    pub publish_all: bool,
    pub interactive: bool,
    pub tty: bool,
    pub detach: bool,
    pub use_internal_docker_network: bool,

    // Execution
    pub working_dir: Option<String>,
    pub temp_dir: Option<String>,
    pub shell: Option<String>,
    pub wait_for_transport: bool,
    pub remove_images: bool,

    // Local files
    pub private_key: PathBuf,
    pub public_key: PathBuf,
    pub state_dir: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            socket: None,
            tls: false,
            tls_verify: false,
            tls_cacert: None,
            tls_cert: None,
            tls_key: None,
            use_sudo: false,
            channel: ChannelKind::Cli,
            api_version: None,
            image: None,
            platform: None,
            docker_platform: None,
            dockerfile: None,
            build_context: None,
            build_options: None,
            build_tempdir: None,
            use_cache: true,
            disable_upstart: true,
            provision_command: Vec::new(),
            instance_name: None,
            hostname: None,
            username: None,
            run_command: None,
            run_options: None,
            env_variables: None,
            forward: Vec::new(),
            dns: Vec::new(),
            add_host: BTreeMap::new(),
            volume: Vec::new(),
            volumes_from: Vec::new(),
            links: Vec::new(),
            devices: Vec::new(),
            cap_add: Vec::new(),
            cap_drop: Vec::new(),
            security_opt: Vec::new(),
            memory: None,
            cpu: None,
            gpus: None,
            http_proxy: None,
            https_proxy: None,
            no_proxy: None,
            privileged: false,
            publish_all: false,
            interactive: false,
            tty: false,
            detach: false,
            use_internal_docker_network: false,
            working_dir: None,
            temp_dir: None,
            shell: None,
            wait_for_transport: true,
            remove_images: false,
            private_key: PathBuf::from(constants::DEFAULT_PRIVATE_KEY),
            public_key: PathBuf::from(constants::DEFAULT_PUBLIC_KEY),
            state_dir: PathBuf::from(constants::DEFAULT_STATE_DIR),
        }
    }
}

impl DriverConfig {
    /// Load options from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            DriverError::Configuration(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    /// Fill in every derived default for one sandbox instance
    pub fn resolve(self, instance: &Instance) -> Result<ResolvedConfig> {
        let platform = self
            .platform
            .clone()
            .unwrap_or_else(|| default_platform(&instance.platform_name));
        let kind = PlatformKind::from_platform_name(&platform);

        let image = self
            .image
            .clone()
            .unwrap_or_else(|| default_image(&instance.platform_name));

        let instance_name = self
            .instance_name
            .clone()
            .unwrap_or_else(|| derive_instance_name(&instance.name));

        let run_command = self.run_command.clone().unwrap_or_else(|| match kind {
            // Keeps the Windows container alive without an SSH daemon
            PlatformKind::Windows if self.interactive => "powershell.exe".to_string(),
            PlatformKind::Windows => "ping -t localhost".to_string(),
            PlatformKind::Linux => "/usr/sbin/sshd -D -o UseDNS=no -o UsePAM=no \
                 -o PasswordAuthentication=yes -o UsePrivilegeSeparation=no \
                 -o PidFile=/tmp/sshd.pid"
                .to_string(),
        });

        let socket = self.socket.clone().unwrap_or_else(|| default_socket(kind));

        let username = match (&self.username, kind) {
            (Some(user), _) => Some(user.clone()),
            (None, PlatformKind::Linux) => Some("dockbox".to_string()),
            (None, PlatformKind::Windows) => None,
        };

        let temp_dir = self.temp_dir.clone().unwrap_or_else(|| match kind {
            PlatformKind::Windows => "$env:TEMP".to_string(),
            PlatformKind::Linux => "/tmp".to_string(),
        });

        let build_context = self
            .build_context
            .unwrap_or_else(|| !is_remote_socket(&socket));

        // Reject a non-mapping env block before any engine command runs
        if let Some(vars) = &self.env_variables {
            command::env_variable_args(vars)?;
        }

        Ok(ResolvedConfig {
            options: self,
            platform,
            kind,
            image,
            instance_name,
            run_command,
            socket,
            username,
            temp_dir,
            build_context,
        })
    }
}

/// Configuration with every derived option computed
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub options: DriverConfig,
    pub platform: String,
    pub kind: PlatformKind,
    pub image: String,
    pub instance_name: String,
    pub run_command: String,
    pub socket: String,
    pub username: Option<String>,
    pub temp_dir: String,
    pub build_context: bool,
}

impl ResolvedConfig {
    pub fn remote_socket(&self) -> bool {
        is_remote_socket(&self.socket)
    }

    /// Host part of a `tcp://` socket
    pub fn socket_host(&self) -> Option<String> {
        url::Url::parse(&self.socket)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }

    pub fn home_dir(&self) -> String {
        match self.username.as_deref() {
            Some("root") => "/root".to_string(),
            Some(user) => format!("/home/{}", user),
            None => "/root".to_string(),
        }
    }

    /// Options exposed to user Dockerfile templates
    pub fn template_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(&self.options) {
            for (key, value) in map {
                match value {
                    serde_json::Value::Null => {}
                    serde_json::Value::String(s) => {
                        values.insert(key, s);
                    }
                    other => {
                        values.insert(key, other.to_string());
                    }
                }
            }
        }
        values.insert("platform".to_string(), self.platform.clone());
        values.insert("image".to_string(), self.image.clone());
        values.insert("instance_name".to_string(), self.instance_name.clone());
        values.insert("run_command".to_string(), self.run_command.clone());
        values.insert("socket".to_string(), self.socket.clone());
        values.insert("temp_dir".to_string(), self.temp_dir.clone());
        if let Some(user) = &self.username {
            values.insert("username".to_string(), user.clone());
        }
        values
    }
}

fn is_remote_socket(socket: &str) -> bool {
    url::Url::parse(socket)
        .map(|u| u.scheme() == "tcp")
        .unwrap_or(false)
}

fn default_socket(kind: PlatformKind) -> String {
    if let Ok(host) = std::env::var(constants::DOCKER_HOST) {
        if !host.is_empty() {
            return host;
        }
    }
    match kind {
        PlatformKind::Windows => constants::DEFAULT_NPIPE_SOCKET.to_string(),
        PlatformKind::Linux => constants::DEFAULT_UNIX_SOCKET.to_string(),
    }
}

/// `ubuntu-20.04` → `ubuntu`
pub fn default_platform(platform_name: &str) -> String {
    platform_name
        .split('-')
        .next()
        .unwrap_or(platform_name)
        .to_string()
}

/// `ubuntu-20.04` → `ubuntu:20.04`, `centos-7.9` → `centos:centos7`
pub fn default_image(platform_name: &str) -> String {
    let mut parts = platform_name.split('-');
    let platform = parts.next().unwrap_or(platform_name);
    match parts.next() {
        Some(release) if platform == "centos" => {
            let major = release.split('.').next().unwrap_or(release);
            format!("{}:centos{}", platform, major)
        }
        Some(release) => format!("{}:{}", platform, release),
        None => platform.to_string(),
    }
}

fn strip_non_word(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// `<instance>-<login>-<host>-<random>`, unique per run
pub fn derive_instance_name(instance: &str) -> String {
    let login = std::env::var(constants::USER)
        .or_else(|_| std::env::var(constants::USERNAME))
        .unwrap_or_else(|_| "nologin".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default();
    let host: String = strip_non_word(&host).chars().take(21).collect();

    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| std::char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
        .collect();

    [strip_non_word(instance), strip_non_word(&login), host, suffix]
        .join("-")
        .to_lowercase()
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a scalar value, got {}",
            other
        ))),
    }
}
