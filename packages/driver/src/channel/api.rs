// ABOUTME: Execution channel talking to the engine API through bollard
// ABOUTME: Translates sandbox options into create/start/exec/archive calls and reads structured responses

use super::{BuildContext, ExecOutput, ExecutionChannel};
use crate::config::{PlatformKind, ResolvedConfig};
use crate::error::{DriverError, Result};
use crate::parser::{ImageIdParser, PortMapping};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
    },
    exec::{CreateExecOptions, StartExecResults},
    image::BuildImageOptions,
    models::{
        ContainerInspectResponse, ContainerSummary, DeviceMapping, DeviceRequest, HostConfig,
        PortBinding,
    },
    ClientVersion, Docker, API_DEFAULT_VERSION,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TIMEOUT_SECS: u64 = 600;

pub struct ApiChannel {
    client: Docker,
    config: Arc<ResolvedConfig>,
    image_ids: ImageIdParser,
}

impl ApiChannel {
    /// Client scoped to the configured socket
    pub fn connect(config: Arc<ResolvedConfig>) -> Result<Self> {
        let options = &config.options;
        if options.tls || options.tls_verify || options.tls_cert.is_some() {
            return Err(DriverError::Configuration(
                "TLS sockets are only supported by the cli channel".to_string(),
            ));
        }

        let version = match &options.api_version {
            Some(version) => parse_api_version(version)?,
            None => ClientVersion {
                major_version: API_DEFAULT_VERSION.major_version,
                minor_version: API_DEFAULT_VERSION.minor_version,
            },
        };

        let socket = config.socket.as_str();
        let client = if socket.starts_with("tcp://") || socket.starts_with("http://") {
            let address = socket.replacen("tcp://", "http://", 1);
            Docker::connect_with_http(&address, TIMEOUT_SECS, &version)
        } else {
            let path = socket
                .strip_prefix("unix://")
                .or_else(|| socket.strip_prefix("npipe://"))
                .unwrap_or(socket);
            Docker::connect_with_socket(path, TIMEOUT_SECS, &version)
        }
        .map_err(|e| DriverError::EngineUnavailable(e.to_string()))?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Docker, config: Arc<ResolvedConfig>) -> Self {
        Self {
            client,
            config,
            image_ids: ImageIdParser::default(),
        }
    }

    /// Container create body equivalent to the cli channel's `run` flags
    fn to_bollard_config(
        &self,
        image_id: &str,
        transport_port: Option<u16>,
    ) -> Result<Config<String>> {
        let options = &self.config.options;

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        if let Some(port) = transport_port {
            let key = format!("{}/tcp", port);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: None,
                }]),
            );
        }
        for forward in &options.forward {
            let (key, binding) = parse_forward(forward)?;
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings
                .entry(key)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(binding);
        }

        let mut env: Vec<String> = Vec::new();
        if let Some(vars) = options.env_variables.as_ref().and_then(|v| v.as_object()) {
            for (key, value) in vars {
                let value = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                env.push(format!("{}={}", key.trim(), value.trim()));
            }
        }
        if let Some(proxy) = &options.http_proxy {
            env.push(format!("http_proxy={}", proxy));
        }
        if let Some(proxy) = &options.https_proxy {
            env.push(format!("https_proxy={}", proxy));
        }

        if options.run_options.is_some() {
            warn!("run_options are ignored by the api channel");
        }

        let host_config = HostConfig {
            port_bindings: non_empty_map(port_bindings),
            binds: non_empty(options.volume.clone()),
            dns: non_empty(options.dns.clone()),
            extra_hosts: non_empty(
                options
                    .add_host
                    .iter()
                    .map(|(host, ip)| format!("{}:{}", host, ip))
                    .collect(),
            ),
            volumes_from: non_empty(options.volumes_from.clone()),
            links: non_empty(options.links.clone()),
            devices: non_empty(options.devices.iter().map(|d| parse_device(d)).collect()),
            cap_add: non_empty(options.cap_add.clone()),
            cap_drop: non_empty(options.cap_drop.clone()),
            security_opt: non_empty(options.security_opt.clone()),
            memory: options.memory.as_deref().map(parse_memory).transpose()?,
            cpu_shares: options
                .cpu
                .as_deref()
                .map(|cpu| {
                    cpu.parse::<i64>().map_err(|_| {
                        DriverError::Configuration(format!("Invalid cpu shares '{}'", cpu))
                    })
                })
                .transpose()?,
            device_requests: options.gpus.as_deref().map(gpu_requests),
            privileged: Some(options.privileged),
            publish_all_ports: Some(options.publish_all),
            ..Default::default()
        };

        Ok(Config {
            image: Some(image_id.to_string()),
            cmd: Some(
                self.config
                    .run_command
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            ),
            env: non_empty(env),
            hostname: options.hostname.clone(),
            tty: Some(options.tty),
            open_stdin: Some(options.interactive),
            exposed_ports: non_empty_map(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        })
    }

    fn exec_argv(&self, command: &str) -> Vec<String> {
        match self.config.kind {
            PlatformKind::Windows => vec![
                "cmd.exe".to_string(),
                "/c".to_string(),
                command.to_string(),
            ],
            PlatformKind::Linux => {
                let shell = self.config.options.shell.as_deref().unwrap_or("/bin/sh");
                vec![shell.to_string(), "-c".to_string(), command.to_string()]
            }
        }
    }
}

#[async_trait]
impl ExecutionChannel for ApiChannel {
    async fn verify(&self) -> Result<()> {
        self.client.ping().await.map(|_| ()).map_err(|e| {
            DriverError::EngineUnavailable(format!(
                "Cannot reach the engine at {}: {}. Install Docker from https://www.docker.com/get-started",
                self.config.socket, e
            ))
        })
    }

    async fn build_image(&self, context: &BuildContext) -> Result<String> {
        info!("Building image for {}", self.config.instance_name);
        let archive = build_archive(&context.dockerfile, context.root.as_deref())
            .map_err(|e| DriverError::engine("build image", e))?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            nocache: !self.config.options.use_cache,
            platform: self.config.options.docker_platform.clone().unwrap_or_default(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self
            .client
            .build_image(options, None, Some(archive.into()));
        let mut transcript = String::new();
        while let Some(message) = stream.next().await {
            let info = message.map_err(|e| DriverError::engine("build image", e))?;
            if let Some(error) = info.error {
                return Err(DriverError::engine("build image", error));
            }
            if let Some(text) = info.stream {
                debug!("{}", text.trim_end());
                transcript.push_str(&text);
            }
        }

        self.image_ids
            .parse(&transcript)
            .map_err(|e| e.context("build image"))
    }

    async fn run_container(&self, image_id: &str, transport_port: Option<u16>) -> Result<String> {
        let body = self.to_bollard_config(image_id, transport_port)?;
        let options = CreateContainerOptions {
            name: self.config.instance_name.clone(),
            platform: self.config.options.docker_platform.clone(),
        };

        let container = self
            .client
            .create_container(Some(options), body)
            .await
            .map_err(|e| DriverError::engine("create container", e))?;
        debug!("Created container: {}", container.id);

        self.client
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DriverError::engine("start container", e))?;

        Ok(container.id)
    }

    async fn container_exists(&self, container_id: &str) -> bool {
        match self.client.inspect_container(container_id, None).await {
            Ok(inspect) => inspect
                .state
                .and_then(|state| state.running)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn container_ip(&self, container_id: &str) -> Result<String> {
        let inspect = self
            .client
            .inspect_container(container_id, None)
            .await
            .map_err(|e| DriverError::engine("resolve container address", e))?;
        inspect
            .network_settings
            .and_then(|settings| settings.ip_address)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| {
                DriverError::engine(
                    "resolve container address",
                    "Error getting internal IP of container",
                )
            })
    }

    async fn container_port(&self, container_id: &str, port: u16) -> Result<PortMapping> {
        let inspect = self
            .client
            .inspect_container(container_id, None)
            .await
            .map_err(|e| DriverError::parse("Container has no SSH port mapped", &e.to_string()))?;
        port_mapping(&inspect, port)
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.client
            .stop_container(container_id, Some(StopContainerOptions { t: 0 }))
            .await
            .map_err(|e| DriverError::engine("stop container", e))
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        self.client
            .remove_container(container_id, Some(RemoveContainerOptions::default()))
            .await
            .map_err(|e| DriverError::engine("remove container", e))
    }

    async fn image_exists(&self, image_id: &str) -> bool {
        self.client.inspect_image(image_id).await.is_ok()
    }

    async fn image_in_use(&self, image_id: &str) -> Result<bool> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| DriverError::engine("list containers", e))?;

        Ok(containers.iter().any(|summary| uses_image(summary, image_id)))
    }

    async fn remove_image(&self, image_id: &str) -> Result<()> {
        self.client
            .remove_image(image_id, None, None)
            .await
            .map(|_| ())
            .map_err(|e| DriverError::engine("remove image", e))
    }

    async fn exec(&self, container_id: &str, command: &str) -> Result<ExecOutput> {
        let options = &self.config.options;
        let mut env = vec!["TERM=xterm".to_string()];
        if let Some(vars) = options.env_variables.as_ref().and_then(|v| v.as_object()) {
            for (key, value) in vars {
                let value = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                env.push(format!("{}={}", key.trim(), value.trim()));
            }
        }

        let exec_config = CreateExecOptions {
            cmd: Some(self.exec_argv(command)),
            env: Some(env),
            user: self.config.username.clone(),
            working_dir: options.working_dir.clone(),
            privileged: Some(options.privileged),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .client
            .create_exec(container_id, exec_config)
            .await
            .map_err(|e| DriverError::engine("execute command on container", e))?;

        let start_result = self
            .client
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| DriverError::engine("execute command on container", e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        match start_result {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                        Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                        Ok(LogOutput::Console { message }) => stdout.extend_from_slice(&message),
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(DriverError::engine(
                    "execute command on container",
                    "Exec was detached unexpectedly",
                ))
            }
        }

        let exec_inspect = self
            .client
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| DriverError::engine("execute command on container", e))?;

        Ok(ExecOutput {
            exit_code: exec_inspect.exit_code.unwrap_or(0),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn copy_to_container(
        &self,
        container_id: &str,
        local: &Path,
        remote: &str,
    ) -> Result<()> {
        info!("Copying {} to container {}:{}", local.display(), container_id, remote);

        if !local.exists() {
            return Err(DriverError::Configuration(format!(
                "Source path does not exist: {}",
                local.display()
            )));
        }
        let tar_data = create_tar_archive(local)
            .map_err(|e| DriverError::engine(format!("copy {}", local.display()), e))?;

        let options = UploadToContainerOptions {
            path: remote.to_string(),
            ..Default::default()
        };
        self.client
            .upload_to_container(container_id, Some(options), tar_data.into())
            .await
            .map_err(|e| DriverError::engine(format!("copy {}", local.display()), e))
    }
}

/// Host endpoint published for `port`, from `NetworkSettings.Ports["<port>/tcp"]`
fn port_mapping(inspect: &ContainerInspectResponse, port: u16) -> Result<PortMapping> {
    let key = format!("{}/tcp", port);
    let binding = inspect
        .network_settings
        .as_ref()
        .and_then(|settings| settings.ports.as_ref())
        .and_then(|ports| ports.get(&key))
        .and_then(|bindings| bindings.as_ref())
        .and_then(|bindings| bindings.first());

    binding
        .and_then(|b| {
            let port = b.host_port.as_deref()?.parse::<u16>().ok()?;
            Some(PortMapping {
                host: b
                    .host_ip
                    .clone()
                    .filter(|ip| !ip.is_empty())
                    .unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
            })
        })
        .ok_or_else(|| DriverError::parse("Container has no SSH port mapped", &key))
}

/// Whether a container was created from `image_id` (full, `sha256:`-less or short form)
fn uses_image(summary: &ContainerSummary, image_id: &str) -> bool {
    let wanted = image_id.strip_prefix("sha256:").unwrap_or(image_id);
    if wanted.is_empty() {
        return false;
    }
    let by_id = summary
        .image_id
        .as_deref()
        .map(|id| id.strip_prefix("sha256:").unwrap_or(id).starts_with(wanted))
        .unwrap_or(false);
    by_id || summary.image.as_deref() == Some(image_id)
}

/// `"1.24"` → API version 1.24
fn parse_api_version(version: &str) -> Result<ClientVersion> {
    let invalid = || DriverError::Configuration(format!("Invalid api_version '{}'", version));
    let (major, minor) = version.trim().split_once('.').ok_or_else(invalid)?;
    Ok(ClientVersion {
        major_version: major.parse().map_err(|_| invalid())?,
        minor_version: minor.parse().map_err(|_| invalid())?,
    })
}

/// `[ip:][host_port:]container_port[/proto]` → exposed port key and binding
fn parse_forward(forward: &str) -> Result<(String, PortBinding)> {
    let (spec, proto) = forward.split_once('/').unwrap_or((forward, "tcp"));
    let parts: Vec<&str> = spec.split(':').collect();
    let (host_ip, host_port, container_port) = match parts.as_slice() {
        [container] => (None, None, *container),
        [host, container] => (None, Some(*host), *container),
        [ip, host, container] => (Some(*ip), Some(*host), *container),
        _ => {
            return Err(DriverError::Configuration(format!(
                "Invalid forwarded port '{}'",
                forward
            )))
        }
    };
    if container_port.parse::<u16>().is_err() {
        return Err(DriverError::Configuration(format!(
            "Invalid forwarded port '{}'",
            forward
        )));
    }

    Ok((
        format!("{}/{}", container_port, proto),
        PortBinding {
            host_ip: host_ip.filter(|ip| !ip.is_empty()).map(str::to_string),
            host_port: host_port.filter(|p| !p.is_empty()).map(str::to_string),
        },
    ))
}

/// `/dev/host[:/dev/container[:perms]]`
fn parse_device(device: &str) -> DeviceMapping {
    let mut parts = device.splitn(3, ':');
    let host = parts.next().unwrap_or(device).to_string();
    let container = parts.next().map(str::to_string).unwrap_or_else(|| host.clone());
    let permissions = parts.next().unwrap_or("rwm").to_string();
    DeviceMapping {
        path_on_host: Some(host),
        path_in_container: Some(container),
        cgroup_permissions: Some(permissions),
    }
}

/// `512m`, `2g`, `1048576` → bytes
fn parse_memory(memory: &str) -> Result<i64> {
    let memory = memory.trim().to_lowercase();
    let (digits, multiplier) = match memory.chars().last() {
        Some('b') => (&memory[..memory.len() - 1], 1),
        Some('k') => (&memory[..memory.len() - 1], 1024),
        Some('m') => (&memory[..memory.len() - 1], 1024 * 1024),
        Some('g') => (&memory[..memory.len() - 1], 1024 * 1024 * 1024),
        _ => (memory.as_str(), 1),
    };
    digits
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| DriverError::Configuration(format!("Invalid memory limit '{}'", memory)))
}

/// `all` or a device count, as the `--gpus` flag accepts
fn gpu_requests(gpus: &str) -> Vec<DeviceRequest> {
    let count = if gpus == "all" {
        -1
    } else {
        gpus.parse::<i64>().unwrap_or(-1)
    };
    vec![DeviceRequest {
        count: Some(count),
        capabilities: Some(vec![vec!["gpu".to_string()]]),
        ..Default::default()
    }]
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn non_empty_map<K, V>(map: HashMap<K, V>) -> Option<HashMap<K, V>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Build root (if any) plus the generated Dockerfile as a tar stream
fn build_archive(dockerfile: &str, root: Option<&Path>) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    if let Some(root) = root {
        archive.append_dir_all(".", root)?;
    }

    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    archive.append_data(&mut header, "Dockerfile", dockerfile.as_bytes())?;

    archive.into_inner()
}

/// Single file, or a directory under its own name
fn create_tar_archive(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    let name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid file name")
    })?;

    if path.is_file() {
        let mut file = std::fs::File::open(path)?;
        archive.append_file(name, &mut file)?;
    } else {
        archive.append_dir_all(name, path)?;
    }

    archive.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DriverConfig, Instance};
    use bollard::models::NetworkSettings;
    use rstest::rstest;

    fn inspect_with_ports(
        ports: Option<HashMap<String, Option<Vec<PortBinding>>>>,
    ) -> ContainerInspectResponse {
        ContainerInspectResponse {
            network_settings: Some(NetworkSettings {
                ports,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn binding(ip: Option<&str>, port: Option<&str>) -> PortBinding {
        PortBinding {
            host_ip: ip.map(str::to_string),
            host_port: port.map(str::to_string),
        }
    }

    fn channel(config: DriverConfig) -> ApiChannel {
        let resolved = DriverConfig {
            socket: Some("unix:///var/run/docker.sock".to_string()),
            instance_name: Some("box".to_string()),
            channel: crate::config::ChannelKind::Api,
            ..config
        }
        .resolve(&Instance {
            name: "suite".to_string(),
            platform_name: "ubuntu-22.04".to_string(),
        })
        .unwrap();
        // Lazy client; nothing here talks to a daemon
        let client =
            Docker::connect_with_http("http://127.0.0.1:2375", 4, API_DEFAULT_VERSION).unwrap();
        ApiChannel::with_client(client, Arc::new(resolved))
    }

    #[rstest]
    #[case("1.24", 1, 24)]
    #[case(" 1.41 ", 1, 41)]
    fn test_parse_api_version(#[case] input: &str, #[case] major: usize, #[case] minor: usize) {
        let version = parse_api_version(input).unwrap();
        assert_eq!(version.major_version, major);
        assert_eq!(version.minor_version, minor);
    }

    #[test]
    fn test_invalid_api_version() {
        assert!(matches!(
            parse_api_version("latest"),
            Err(DriverError::Configuration(_))
        ));
    }

    #[rstest]
    #[case("8080:80", "80/tcp", None, Some("8080"))]
    #[case("53/udp", "53/udp", None, None)]
    #[case("127.0.0.1:2222:22", "22/tcp", Some("127.0.0.1"), Some("2222"))]
    fn test_parse_forward(
        #[case] input: &str,
        #[case] key: &str,
        #[case] ip: Option<&str>,
        #[case] host_port: Option<&str>,
    ) {
        let (parsed_key, binding) = parse_forward(input).unwrap();
        assert_eq!(parsed_key, key);
        assert_eq!(binding.host_ip.as_deref(), ip);
        assert_eq!(binding.host_port.as_deref(), host_port);
    }

    #[rstest]
    #[case("512m", 512 * 1024 * 1024)]
    #[case("2g", 2 * 1024 * 1024 * 1024)]
    #[case("1048576", 1048576)]
    fn test_parse_memory(#[case] input: &str, #[case] bytes: i64) {
        assert_eq!(parse_memory(input).unwrap(), bytes);
    }

    #[rstest]
    #[case("99999999999g")]
    #[case("9223372036854775807k")]
    #[case("lots")]
    #[case("")]
    fn test_parse_memory_rejects_invalid(#[case] input: &str) {
        assert!(matches!(
            parse_memory(input),
            Err(DriverError::Configuration(_))
        ));
    }

    #[test]
    fn test_port_mapping_reads_first_binding() {
        let inspect = inspect_with_ports(Some(HashMap::from([(
            "22/tcp".to_string(),
            Some(vec![
                binding(Some("0.0.0.0"), Some("32768")),
                binding(Some("::"), Some("32768")),
            ]),
        )])));
        assert_eq!(
            port_mapping(&inspect, 22).unwrap(),
            PortMapping {
                host: "0.0.0.0".to_string(),
                port: 32768,
            }
        );
    }

    #[test]
    fn test_port_mapping_defaults_blank_host() {
        let inspect = inspect_with_ports(Some(HashMap::from([(
            "22/tcp".to_string(),
            Some(vec![binding(Some(""), Some("2222"))]),
        )])));
        let mapping = port_mapping(&inspect, 22).unwrap();
        assert_eq!(mapping.host, "0.0.0.0");
        assert_eq!(mapping.port, 2222);
    }

    #[rstest]
    #[case::no_network_settings(ContainerInspectResponse::default())]
    #[case::no_ports(inspect_with_ports(None))]
    #[case::missing_key(inspect_with_ports(Some(HashMap::from([(
        "80/tcp".to_string(),
        Some(vec![binding(None, Some("8080"))]),
    )]))))]
    #[case::unpublished(inspect_with_ports(Some(HashMap::from([("22/tcp".to_string(), None)]))))]
    #[case::empty_bindings(inspect_with_ports(Some(HashMap::from([("22/tcp".to_string(), Some(vec![]))]))))]
    #[case::no_host_port(inspect_with_ports(Some(HashMap::from([(
        "22/tcp".to_string(),
        Some(vec![binding(Some("0.0.0.0"), None)]),
    )]))))]
    #[case::garbage_host_port(inspect_with_ports(Some(HashMap::from([(
        "22/tcp".to_string(),
        Some(vec![binding(Some("0.0.0.0"), Some("ssh"))]),
    )]))))]
    fn test_port_mapping_without_ssh_binding(#[case] inspect: ContainerInspectResponse) {
        match port_mapping(&inspect, 22).unwrap_err() {
            DriverError::Parse { message, output } => {
                assert!(message.contains("no SSH port mapped"));
                assert_eq!(output, "22/tcp");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    const FULL_ID: &str = "sha256:4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945";

    fn summary(image: Option<&str>, image_id: Option<&str>) -> ContainerSummary {
        ContainerSummary {
            image: image.map(str::to_string),
            image_id: image_id.map(str::to_string),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::full_id(summary(Some("ubuntu:22.04"), Some(FULL_ID)), FULL_ID, true)]
    #[case::without_prefix(
        summary(None, Some(FULL_ID)),
        "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945",
        true
    )]
    #[case::short_id(summary(None, Some(FULL_ID)), "4f53cda18c2b", true)]
    #[case::by_image_name(summary(Some("4f53cda18c2b"), None), "4f53cda18c2b", true)]
    #[case::other_image(summary(Some("debian:12"), Some("sha256:0123abcd")), FULL_ID, false)]
    #[case::no_fields(summary(None, None), FULL_ID, false)]
    #[case::empty_id(summary(None, Some(FULL_ID)), "sha256:", false)]
    fn test_uses_image(
        #[case] container: ContainerSummary,
        #[case] image_id: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(uses_image(&container, image_id), expected);
    }

    #[test]
    fn test_tls_rejected() {
        let resolved = DriverConfig {
            tls_verify: true,
            ..Default::default()
        }
        .resolve(&Instance {
            name: "suite".to_string(),
            platform_name: "ubuntu-22.04".to_string(),
        })
        .unwrap();
        assert!(matches!(
            ApiChannel::connect(Arc::new(resolved)),
            Err(DriverError::Configuration(_))
        ));
    }

    #[test]
    fn test_bollard_config_translation() {
        let mut config = DriverConfig {
            forward: vec!["8080:80".to_string()],
            volume: vec!["/a:/b".to_string()],
            privileged: true,
            memory: Some("256m".to_string()),
            env_variables: Some(serde_json::json!({"LANG": "C.UTF-8"})),
            ..Default::default()
        };
        config
            .add_host
            .insert("db.local".to_string(), "10.0.0.2".to_string());
        let channel = channel(config);

        let body = channel.to_bollard_config("img", Some(22)).unwrap();
        let host = body.host_config.unwrap();
        let ports = host.port_bindings.unwrap();
        assert!(ports.contains_key("22/tcp"));
        assert!(ports.contains_key("80/tcp"));
        assert_eq!(host.binds, Some(vec!["/a:/b".to_string()]));
        assert_eq!(host.extra_hosts, Some(vec!["db.local:10.0.0.2".to_string()]));
        assert_eq!(host.privileged, Some(true));
        assert_eq!(host.memory, Some(256 * 1024 * 1024));
        assert_eq!(body.env, Some(vec!["LANG=C.UTF-8".to_string()]));
        assert_eq!(body.image.as_deref(), Some("img"));
        assert_eq!(body.cmd.unwrap()[0], "/usr/sbin/sshd");
    }

    #[test]
    fn test_exec_argv_honours_shell_option() {
        let channel = channel(DriverConfig {
            shell: Some("/bin/bash".to_string()),
            ..Default::default()
        });
        assert_eq!(channel.exec_argv("id"), vec!["/bin/bash", "-c", "id"]);
    }

    #[test]
    fn test_build_archive_contains_dockerfile() {
        let data = build_archive("FROM scratch\n", None).unwrap();
        let mut archive = tar::Archive::new(data.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Dockerfile"]);
    }

    #[test]
    fn test_directory_archive_keeps_its_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("payload");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("a.txt"), "a").unwrap();

        let data = create_tar_archive(&nested).unwrap();
        let mut archive = tar::Archive::new(data.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n == "payload/a.txt"));
    }
}
