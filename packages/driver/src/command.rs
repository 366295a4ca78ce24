// ABOUTME: Pure builders turning sandbox configuration into container engine command lines
// ABOUTME: Nothing here spawns a process; channels decide how the strings are executed

use crate::config::{ExtraOptions, ResolvedConfig};
use crate::error::{DriverError, Result};
use std::path::Path;

/// `[sudo -E ]<binary> [-H <socket>] [--tls...]`
pub fn engine_prefix(config: &ResolvedConfig) -> String {
    let options = &config.options;
    let mut docker = String::new();
    if options.use_sudo {
        docker.push_str("sudo -E ");
    }
    docker.push_str(&options.binary);
    docker.push_str(&format!(" -H {}", config.socket));
    if options.tls {
        docker.push_str(" --tls");
    }
    if options.tls_verify {
        docker.push_str(" --tlsverify");
    }
    if let Some(cacert) = &options.tls_cacert {
        docker.push_str(&format!(" --tlscacert={}", cacert));
    }
    if let Some(cert) = &options.tls_cert {
        docker.push_str(&format!(" --tlscert={}", cert));
    }
    if let Some(key) = &options.tls_key {
        docker.push_str(&format!(" --tlskey={}", key));
    }
    docker
}

/// Full command line for one engine subcommand
pub fn engine_command(config: &ResolvedConfig, subcommand: &str) -> String {
    format!("{} {}", engine_prefix(config), subcommand)
}

/// Image build arguments. The Dockerfile is expected on stdin when there is no build context.
pub fn build_command(config: &ResolvedConfig, dockerfile_path: &Path) -> String {
    let options = &config.options;
    let mut cmd = String::from("build");
    if !options.use_cache {
        cmd.push_str(" --no-cache");
    }
    if let Some(platform) = &options.docker_platform {
        cmd.push_str(&format!(" --platform={}", platform));
    }
    let extra = config_to_options(options.build_options.as_ref());
    if !extra.is_empty() {
        cmd.push(' ');
        cmd.push_str(&extra);
    }
    let context = if config.build_context { "." } else { "-" };
    cmd.push_str(&format!(
        " -f {} {}",
        shell_escape(&dockerfile_path.to_string_lossy()),
        context
    ));
    cmd
}

/// Container start arguments; the reserved transport port is always published first
pub fn run_command(
    config: &ResolvedConfig,
    image_id: &str,
    reserved_port: Option<u16>,
) -> Result<String> {
    let options = &config.options;
    let mut cmd = String::from("run -d");
    if options.interactive {
        cmd.push_str(" -i");
    }
    if options.tty {
        cmd.push_str(" -t");
    }
    if let Some(vars) = &options.env_variables {
        cmd.push_str(&env_variable_args(vars)?);
    }
    if let Some(port) = reserved_port {
        cmd.push_str(&format!(" -p {}", port));
    }
    for port in &options.forward {
        cmd.push_str(&format!(" -p {}", port));
    }
    for dns in &options.dns {
        cmd.push_str(&format!(" --dns {}", dns));
    }
    for (host, ip) in &options.add_host {
        cmd.push_str(&format!(" --add-host={}:{}", host, ip));
    }
    for volume in &options.volume {
        cmd.push_str(&format!(" -v {}", volume));
    }
    for container in &options.volumes_from {
        cmd.push_str(&format!(" --volumes-from {}", container));
    }
    for link in &options.links {
        cmd.push_str(&format!(" --link {}", link));
    }
    for device in &options.devices {
        cmd.push_str(&format!(" --device {}", device));
    }
    for cap in &options.cap_add {
        cmd.push_str(&format!(" --cap-add={}", cap));
    }
    for cap in &options.cap_drop {
        cmd.push_str(&format!(" --cap-drop={}", cap));
    }
    for opt in &options.security_opt {
        cmd.push_str(&format!(" --security-opt={}", opt));
    }
    if let Some(memory) = &options.memory {
        cmd.push_str(&format!(" -m {}", memory));
    }
    if let Some(cpu) = &options.cpu {
        cmd.push_str(&format!(" -c {}", cpu));
    }
    if let Some(gpus) = &options.gpus {
        cmd.push_str(&format!(" --gpus {}", gpus));
    }
    if let Some(proxy) = &options.http_proxy {
        cmd.push_str(&format!(" -e http_proxy={}", proxy));
    }
    if let Some(proxy) = &options.https_proxy {
        cmd.push_str(&format!(" -e https_proxy={}", proxy));
    }
    if let Some(platform) = &options.docker_platform {
        cmd.push_str(&format!(" --platform={}", platform));
    }
    cmd.push_str(&format!(" --name {}", config.instance_name));
    if let Some(hostname) = &options.hostname {
        cmd.push_str(&format!(" -h {}", hostname));
    }
    if options.publish_all {
        cmd.push_str(" -P");
    }
    if options.privileged {
        cmd.push_str(" --privileged");
    }
    let extra = config_to_options(options.run_options.as_ref());
    if !extra.is_empty() {
        cmd.push(' ');
        cmd.push_str(&extra);
    }
    cmd.push_str(&format!(" {} {}", image_id, config.run_command));
    Ok(cmd)
}

/// Arguments running `command` inside an existing container
pub fn exec_command(config: &ResolvedConfig, container_id: &str, command: &str) -> Result<String> {
    let options = &config.options;
    let mut cmd = String::from("exec");
    if options.detach {
        cmd.push_str(" -d");
    }
    if let Some(vars) = &options.env_variables {
        cmd.push_str(&env_variable_args(vars)?);
    }
    if options.privileged {
        cmd.push_str(" --privileged");
    }
    if options.tty {
        cmd.push_str(" -t");
    }
    if options.interactive {
        cmd.push_str(" -i");
    }
    if let Some(user) = &config.username {
        cmd.push_str(&format!(" -u {}", user));
    }
    if let Some(dir) = &options.working_dir {
        cmd.push_str(&format!(" -w {}", dir));
    }
    cmd.push_str(&format!(" {} {}", container_id, command));
    Ok(cmd)
}

pub fn copy_command(local: &str, remote: &str, archive: bool) -> String {
    let mut cmd = String::from("cp");
    if archive {
        cmd.push_str(" -a");
    }
    cmd.push_str(&format!(" {} {}", local, remote));
    cmd
}

pub fn powershell_command(args: &str) -> String {
    format!("powershell -ExecutionPolicy Bypass -NoLogo {}", args)
}

/// Flatten free-form options into a command line fragment.
///
/// Strings pass through, lists are joined with spaces and mappings become
/// `--key=value` tokens sorted by key, one per value.
pub fn config_to_options(options: Option<&ExtraOptions>) -> String {
    match options {
        None => String::new(),
        Some(ExtraOptions::Text(text)) => text.clone(),
        Some(ExtraOptions::List(items)) => items
            .iter()
            .map(|item| config_to_options(Some(item)))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Some(ExtraOptions::Map(map)) => map
            .iter()
            .flat_map(|(key, value)| {
                option_values(value)
                    .into_iter()
                    .map(move |v| format!("--{}={}", key, shell_escape(&v)))
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn option_values(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(items) => items.iter().flat_map(option_values).collect(),
        serde_json::Value::String(s) => vec![s.clone()],
        other => vec![other.to_string()],
    }
}

/// ` -e KEY="value"` for every entry of a mapping
pub fn env_variable_args(vars: &serde_json::Value) -> Result<String> {
    let map = vars.as_object().ok_or_else(|| {
        DriverError::Configuration("Environment variables are not of a mapping type".to_string())
    })?;

    let mut args = String::new();
    for (key, value) in map {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        args.push_str(&format!(" -e {}=\"{}\"", key.trim(), value.trim()));
    }
    Ok(args)
}

/// Backslash-escape every character a POSIX shell would interpret
pub fn shell_escape(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }

    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => escaped.push_str("'\n'"),
            c if c.is_ascii_alphanumeric() || "_-.,:+/@".contains(c) => escaped.push(c),
            c => {
                escaped.push('\\');
                escaped.push(c);
            }
        }
    }
    escaped
}
