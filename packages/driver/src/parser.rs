// ABOUTME: Parsers recovering image ids, container ids, ports and environments from engine output
// ABOUTME: Image id recognition is a list of pluggable patterns since the build output format varies by engine release

use crate::error::{DriverError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// One way of recognising an image id in build output
pub trait ImageIdPattern: Send + Sync {
    fn name(&self) -> &'static str;

    /// The image id if this line announces one
    fn extract(&self, line: &str) -> Option<String>;
}

/// BuildKit: `writing image sha256:<64 hex> 0.0s done`
pub struct BuildKitDigest;

impl ImageIdPattern for BuildKitDigest {
    fn name(&self) -> &'static str {
        "buildkit-digest"
    }

    fn extract(&self, line: &str) -> Option<String> {
        static DIGEST: OnceLock<Option<Regex>> = OnceLock::new();
        DIGEST
            .get_or_init(|| Regex::new(r"writing image (sha256:[0-9a-f]{64})").ok())
            .as_ref()?
            .captures(line)
            .map(|caps| caps[1].to_string())
    }
}

/// Classic builder: `Successfully built abc123`, `Image ID abc123`, `build successful abc123`
pub struct LegacyMarker;

impl ImageIdPattern for LegacyMarker {
    fn name(&self) -> &'static str {
        "legacy-marker"
    }

    fn extract(&self, line: &str) -> Option<String> {
        let lower = line.to_lowercase();
        if ["image id", "build successful", "successfully built"]
            .iter()
            .any(|marker| lower.contains(marker))
        {
            line.split_whitespace().last().map(|s| s.to_string())
        } else {
            None
        }
    }
}

/// Tries each pattern on every line, in order
pub struct ImageIdParser {
    patterns: Vec<Box<dyn ImageIdPattern>>,
}

impl Default for ImageIdParser {
    fn default() -> Self {
        Self {
            patterns: vec![Box::new(BuildKitDigest), Box::new(LegacyMarker)],
        }
    }
}

impl ImageIdParser {
    pub fn new(patterns: Vec<Box<dyn ImageIdPattern>>) -> Self {
        Self { patterns }
    }

    pub fn with_pattern(mut self, pattern: Box<dyn ImageIdPattern>) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn parse(&self, output: &str) -> Result<String> {
        for line in output.lines() {
            for pattern in &self.patterns {
                if let Some(id) = pattern.extract(line) {
                    tracing::debug!("Image id {} recognised by {}", id, pattern.name());
                    return Ok(id);
                }
            }
        }
        Err(DriverError::parse(
            "Could not parse build output for image ID",
            output,
        ))
    }
}

/// Image id with the default patterns
pub fn parse_image_id(output: &str) -> Result<String> {
    ImageIdParser::default().parse(output)
}

/// Accepts only 12 or 64 hexadecimal characters after trimming
pub fn parse_container_id(output: &str) -> Result<String> {
    let id = output.trim_end();
    let is_hex = id.chars().all(|c| c.is_ascii_hexdigit());
    if !is_hex || !(id.len() == 12 || id.len() == 64) {
        return Err(DriverError::parse(
            "Could not parse run output for container ID",
            output,
        ));
    }
    Ok(id.to_string())
}

/// Externally reachable endpoint of a published port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host: String,
    pub port: u16,
}

/// First line of `port <id> 22/tcp`, e.g. `0.0.0.0:32768` or `[::]:32768`
pub fn parse_port_mapping(output: &str) -> Result<PortMapping> {
    let no_port = || DriverError::parse("Container has no SSH port mapped", output);

    let line = output.lines().next().map(str::trim).ok_or_else(no_port)?;
    let (host, port) = line.rsplit_once(':').ok_or_else(no_port)?;
    let port = port.parse::<u16>().map_err(|_| no_port())?;
    if host.is_empty() {
        return Err(no_port());
    }

    Ok(PortMapping {
        host: host.to_string(),
        port,
    })
}

/// Whether `ps -a` output still references an image
pub fn image_referenced(ps_output: &str, image_id: &str) -> bool {
    let bare = image_id.strip_prefix("sha256:").unwrap_or(image_id);
    if bare.is_empty() {
        return false;
    }
    let short: String = bare.chars().take(12).collect();
    ps_output.contains(image_id) || ps_output.contains(bare) || ps_output.contains(&short)
}

/// `printenv` output; values may contain `=`
pub fn parse_env_listing(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// PowerShell `GetEnvironmentVariables() | ConvertTo-Json` output
pub fn parse_env_json(output: &str) -> Result<HashMap<String, String>> {
    let value: serde_json::Value = serde_json::from_str(output.trim())
        .map_err(|e| DriverError::parse(format!("Invalid environment JSON: {}", e), output))?;
    let map = value
        .as_object()
        .ok_or_else(|| DriverError::parse("Environment JSON is not an object", output))?;

    Ok(map
        .iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect())
}

/// Placeholder appearing in a remote path: `$env:NAME` or `$NAME`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvPlaceholder {
    /// `$env:NAME`, terminated by `\` or end of string
    PowerShell(String),
    /// `$NAME`, terminated by `/` or end of string
    Posix(String),
}

impl EnvPlaceholder {
    pub fn name(&self) -> &str {
        match self {
            EnvPlaceholder::PowerShell(name) | EnvPlaceholder::Posix(name) => name,
        }
    }

    fn token(&self) -> String {
        match self {
            EnvPlaceholder::PowerShell(name) => format!("$env:{}", name),
            EnvPlaceholder::Posix(name) => format!("${}", name),
        }
    }
}

pub fn env_placeholder(path: &str) -> Option<EnvPlaceholder> {
    static POWERSHELL: OnceLock<Option<Regex>> = OnceLock::new();
    static POSIX: OnceLock<Option<Regex>> = OnceLock::new();

    if path.contains("$env:") {
        let re = POWERSHELL
            .get_or_init(|| Regex::new(r"\$env:(.*?)(\\|$)").ok())
            .as_ref()?;
        re.captures(path)
            .map(|caps| EnvPlaceholder::PowerShell(caps[1].to_string()))
    } else if path.contains('$') {
        let re = POSIX
            .get_or_init(|| Regex::new(r"\$(.*?)(/|$)").ok())
            .as_ref()?;
        re.captures(path)
            .map(|caps| EnvPlaceholder::Posix(caps[1].to_string()))
    } else {
        None
    }
}

/// Replace the placeholder with its value; unknown names become empty
pub fn substitute_env(path: &str, vars: &HashMap<String, String>) -> String {
    match env_placeholder(path) {
        Some(placeholder) => {
            let value = vars
                .get(placeholder.name())
                .map(|v| v.trim())
                .unwrap_or_default();
            path.replace(&placeholder.token(), value)
        }
        None => path.to_string(),
    }
}
