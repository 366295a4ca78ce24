// ABOUTME: Synthesizes the image definition for a sandbox from its platform and options
// ABOUTME: A user template bypasses platform logic and is rendered with {{option}} placeholders

use crate::command::shell_escape;
use crate::config::{Platform, ResolvedConfig};
use crate::error::{DriverError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;

const ARCH: &str = r#"RUN pacman --noconfirm -Sy archlinux-keyring
RUN pacman-db-upgrade
RUN pacman --noconfirm -Syu openssl openssh sudo curl
RUN [ -f "/etc/ssh/ssh_host_rsa_key" ] || ssh-keygen -A -t rsa -f /etc/ssh/ssh_host_rsa_key
RUN [ -f "/etc/ssh/ssh_host_dsa_key" ] || ssh-keygen -A -t dsa -f /etc/ssh/ssh_host_dsa_key
RUN echo >/etc/security/limits.conf
"#;

const DEBIAN_UPSTART: &str = r#"RUN [ ! -f "/sbin/initctl" ] || dpkg-divert --local --rename --add /sbin/initctl \
    && ln -sf /bin/true /sbin/initctl
"#;

const DEBIAN: &str = "ENV DEBIAN_FRONTEND noninteractive
ENV container docker
RUN apt-get update
RUN apt-get install -y sudo openssh-server curl lsb-release
";

const FEDORA: &str = r#"ENV container docker
RUN dnf clean all
RUN dnf install -y sudo openssh-server openssh-clients which curl
RUN [ -f "/etc/ssh/ssh_host_rsa_key" ] || ssh-keygen -t rsa -f /etc/ssh/ssh_host_rsa_key -N ''
RUN [ -f "/etc/ssh/ssh_host_dsa_key" ] || ssh-keygen -t dsa -f /etc/ssh/ssh_host_dsa_key -N ''
"#;

const GENTOO: &str = r#"RUN emerge-webrsync
RUN emerge --quiet --noreplace net-misc/openssh app-admin/sudo
RUN [ -f "/etc/ssh/ssh_host_rsa_key" ] || ssh-keygen -A -t rsa -f /etc/ssh/ssh_host_rsa_key
RUN [ -f "/etc/ssh/ssh_host_dsa_key" ] || ssh-keygen -A -t dsa -f /etc/ssh/ssh_host_dsa_key
"#;

const GENTOO_PALUDIS: &str = r#"RUN cave sync
RUN cave resolve -zx net-misc/openssh app-admin/sudo
RUN [ -f "/etc/ssh/ssh_host_rsa_key" ] || ssh-keygen -A -t rsa -f /etc/ssh/ssh_host_rsa_key
RUN [ -f "/etc/ssh/ssh_host_dsa_key" ] || ssh-keygen -A -t dsa -f /etc/ssh/ssh_host_dsa_key
"#;

const OPENSUSE: &str = "ENV container docker
RUN zypper install -y sudo openssh which curl
RUN /usr/sbin/sshd-gen-keys-start
";

const RHEL: &str = r#"ENV container docker
RUN yum clean all
RUN yum install -y sudo openssh-server openssh-clients which curl
RUN [ -f "/etc/ssh/ssh_host_rsa_key" ] || ssh-keygen -t rsa -f /etc/ssh/ssh_host_rsa_key -N ''
RUN [ -f "/etc/ssh/ssh_host_dsa_key" ] || ssh-keygen -t dsa -f /etc/ssh/ssh_host_dsa_key -N ''
"#;

// CentOS Stream and its rebuilds ship curl-minimal, which conflicts with curl
const YUM_MINIMAL: &str = r#"ENV container docker
RUN yum clean all
RUN yum install -y sudo openssh-server openssh-clients which
RUN [ -f "/etc/ssh/ssh_host_rsa_key" ] || ssh-keygen -t rsa -f /etc/ssh/ssh_host_rsa_key -N ''
RUN [ -f "/etc/ssh/ssh_host_dsa_key" ] || ssh-keygen -t dsa -f /etc/ssh/ssh_host_dsa_key -N ''
"#;

const PHOTON: &str = r#"ENV container docker
RUN tdnf clean all
RUN tdnf install -y sudo openssh-server openssh-clients which curl
RUN [ -f "/etc/ssh/ssh_host_ecdsa_key" ] || ssh-keygen -t ecdsa -f /etc/ssh/ssh_host_ecdsa_key -N ''
RUN [ -f "/etc/ssh/ssh_host_ed25519_key" ] || ssh-keygen -t ed25519 -f /etc/ssh/ssh_host_ed25519_key -N ''
"#;

/// Package installation and SSH host key recipe for a Linux platform
pub fn platform_recipe(platform: Platform, disable_upstart: bool) -> Result<String> {
    let recipe = match platform {
        Platform::Arch => ARCH.to_string(),
        Platform::Debian if disable_upstart => format!("{}{}", DEBIAN_UPSTART, DEBIAN),
        Platform::Debian => DEBIAN.to_string(),
        Platform::Fedora => FEDORA.to_string(),
        Platform::Gentoo => GENTOO.to_string(),
        Platform::GentooPaludis => GENTOO_PALUDIS.to_string(),
        Platform::Opensuse => OPENSUSE.to_string(),
        Platform::Rhel => RHEL.to_string(),
        Platform::CentosStream | Platform::AlmaLinux | Platform::RockyLinux => {
            YUM_MINIMAL.to_string()
        }
        Platform::Photon => PHOTON.to_string(),
        Platform::Windows => {
            return Err(DriverError::Configuration(
                "Unknown platform 'windows' for a Linux image".to_string(),
            ))
        }
    };
    Ok(recipe)
}

/// Account, sudo and SSH directory bootstrap shared by every Linux platform
pub fn base_linux(username: &str, homedir: &str) -> String {
    format!(
        r#"RUN if ! getent passwd {user}; then \
      useradd -d {home} -m -s /bin/bash -p '*' {user}; \
    fi
RUN mkdir -p /etc/sudoers.d
RUN chmod 0750 /etc/sudoers.d
RUN echo "{user} ALL=(ALL) NOPASSWD: ALL" >> /etc/sudoers.d/{user}
RUN echo "Defaults !requiretty" >> /etc/sudoers.d/{user}
RUN mkdir -p {home}/.ssh
RUN chown -R {user} {home}/.ssh
RUN chmod 0700 {home}/.ssh
RUN touch {home}/.ssh/authorized_keys
RUN chown {user} {home}/.ssh/authorized_keys
RUN chmod 0600 {home}/.ssh/authorized_keys
RUN mkdir -p /run/sshd
"#,
        user = username,
        home = homedir
    )
}

/// `ENV` lines for every configured proxy, lower and upper case
pub fn proxy_block(config: &ResolvedConfig) -> String {
    let options = &config.options;
    let mut env = String::new();
    for (lower, upper, value) in [
        ("http_proxy", "HTTP_PROXY", &options.http_proxy),
        ("https_proxy", "HTTPS_PROXY", &options.https_proxy),
        ("no_proxy", "NO_PROXY", &options.no_proxy),
    ] {
        if let Some(value) = value {
            env.push_str(&format!("ENV {} {}\n", lower, value));
            env.push_str(&format!("ENV {} {}\n", upper, value));
        }
    }
    env
}

fn provision_lines(config: &ResolvedConfig) -> String {
    config
        .options
        .provision_command
        .iter()
        .map(|cmd| format!("RUN {}\n", cmd))
        .collect()
}

/// Render a template, replacing `{{name}}` with the matching value.
///
/// Placeholders without a value are rejected rather than left in the output.
pub fn render_template(template: &str, values: &BTreeMap<String, String>) -> Result<String> {
    let mut result = template.to_string();
    for (key, value) in values {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    let leftover = Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
        .map_err(|e| DriverError::Configuration(e.to_string()))?;
    if let Some(caps) = leftover.captures(&result) {
        return Err(DriverError::Configuration(format!(
            "Dockerfile template references unknown option '{}'",
            &caps[1]
        )));
    }
    Ok(result)
}

/// The user template, if one is configured
pub fn from_template(config: &ResolvedConfig) -> Result<Option<String>> {
    let Some(path) = &config.options.dockerfile else {
        return Ok(None);
    };
    let template = read_template(path)?;
    render_template(&template, &config.template_values()).map(Some)
}

fn read_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        DriverError::Configuration(format!(
            "Cannot read Dockerfile template {}: {}",
            path.display(),
            e
        ))
    })
}

/// Image definition for a Linux sandbox reachable over SSH with `public_key`
pub fn linux(config: &ResolvedConfig, public_key: &str) -> Result<String> {
    if let Some(rendered) = from_template(config)? {
        return Ok(rendered);
    }

    let platform: Platform = config.platform.parse()?;
    let recipe = platform_recipe(platform, config.options.disable_upstart)?;
    let username = config.username.as_deref().unwrap_or("root");
    let homedir = config.home_dir();
    let ssh_key = format!(
        "RUN echo {} >> {}/.ssh/authorized_keys",
        shell_escape(public_key.trim()),
        homedir
    );

    let output = [
        format!("FROM {}", config.image),
        proxy_block(config),
        recipe,
        base_linux(username, &homedir),
        provision_lines(config),
        ssh_key,
        String::new(),
    ]
    .join("\n");
    log_dockerfile(&output);
    Ok(output)
}

/// Image definition for a Windows sandbox; no SSH bootstrap
pub fn windows(config: &ResolvedConfig) -> Result<String> {
    let platform: Platform = config.platform.parse()?;
    if platform != Platform::Windows {
        return Err(DriverError::Configuration(format!(
            "Unknown platform '{}'",
            config.platform
        )));
    }
    if let Some(rendered) = from_template(config)? {
        return Ok(rendered);
    }

    let output = [
        format!("FROM {}", config.image),
        proxy_block(config),
        provision_lines(config),
        String::new(),
    ]
    .join("\n");
    log_dockerfile(&output);
    Ok(output)
}

fn log_dockerfile(output: &str) {
    tracing::debug!("--- Start Dockerfile ---");
    tracing::debug!("{}", output.trim());
    tracing::debug!("--- End Dockerfile ---");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DriverConfig, Instance};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Write;

    const KEY: &str = "ssh-rsa AAAAB3Nza dockbox_docker_key";

    fn resolved(platform: &str, config: DriverConfig) -> ResolvedConfig {
        DriverConfig {
            platform: Some(platform.to_string()),
            image: Some("base:latest".to_string()),
            instance_name: Some("box".to_string()),
            socket: Some("unix:///var/run/docker.sock".to_string()),
            ..config
        }
        .resolve(&Instance {
            name: "suite".to_string(),
            platform_name: platform.to_string(),
        })
        .unwrap()
    }

    #[rstest]
    #[case("debian")]
    #[case("ubuntu")]
    #[case("rhel")]
    #[case("centos")]
    #[case("oraclelinux")]
    #[case("amazonlinux")]
    #[case("fedora")]
    #[case("opensuse/leap")]
    #[case("sles")]
    #[case("arch")]
    #[case("gentoo")]
    #[case("gentoo-paludis")]
    #[case("centosstream")]
    #[case("almalinux")]
    #[case("rockylinux")]
    #[case("photon")]
    fn test_linux_recipe_has_single_base_and_ssh_bootstrap(#[case] platform: &str) {
        let output = linux(&resolved(platform, DriverConfig::default()), KEY).unwrap();

        let from_lines = output.lines().filter(|l| l.starts_with("FROM ")).count();
        assert_eq!(from_lines, 1);
        assert!(output.contains("RUN mkdir -p /home/dockbox/.ssh"));
        assert!(output.contains(
            "RUN echo ssh-rsa\\ AAAAB3Nza\\ dockbox_docker_key >> /home/dockbox/.ssh/authorized_keys"
        ));
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn test_debian_upstart_toggle() {
        let with = linux(&resolved("ubuntu", DriverConfig::default()), KEY).unwrap();
        assert!(with.contains("dpkg-divert --local --rename --add /sbin/initctl"));

        let without = linux(
            &resolved(
                "ubuntu",
                DriverConfig {
                    disable_upstart: false,
                    ..Default::default()
                },
            ),
            KEY,
        )
        .unwrap();
        assert!(!without.contains("initctl"));
        assert!(without.contains("RUN apt-get install -y sudo openssh-server curl lsb-release"));
    }

    #[test]
    fn test_root_user_home_and_ordering() {
        let config = resolved(
            "fedora",
            DriverConfig {
                username: Some("root".to_string()),
                http_proxy: Some("http://proxy:3128".to_string()),
                provision_command: vec!["echo one".to_string(), "echo two".to_string()],
                ..Default::default()
            },
        );
        let output = linux(&config, KEY).unwrap();

        assert!(output.contains("useradd -d /root -m -s /bin/bash -p '*' root"));
        let positions: Vec<usize> = [
            "FROM base:latest",
            "ENV http_proxy http://proxy:3128",
            "ENV HTTP_PROXY http://proxy:3128",
            "RUN dnf clean all",
            "RUN mkdir -p /etc/sudoers.d",
            "RUN echo one",
            "RUN echo two",
            "RUN echo ssh-rsa",
        ]
        .iter()
        .map(|needle| output.find(needle).unwrap())
        .collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_unknown_platform_is_configuration_error() {
        let err = linux(&resolved("alpine", DriverConfig::default()), KEY).unwrap_err();
        assert!(matches!(err, DriverError::Configuration(_)));
    }

    #[test]
    fn test_windows_recipe() {
        let config = resolved(
            "windows",
            DriverConfig {
                no_proxy: Some("localhost".to_string()),
                provision_command: vec!["Install-WindowsFeature Web-Server".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(
            windows(&config).unwrap(),
            "FROM base:latest\nENV no_proxy localhost\nENV NO_PROXY localhost\n\nRUN Install-WindowsFeature Web-Server\n\n"
        );
    }

    #[test]
    fn test_template_bypasses_platform_logic() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "FROM {{{{image}}}}\nRUN echo {{{{instance_name}}}}\n").unwrap();

        let config = resolved(
            "alpine",
            DriverConfig {
                dockerfile: Some(file.path().to_path_buf()),
                ..Default::default()
            },
        );
        assert_eq!(
            linux(&config, KEY).unwrap(),
            "FROM base:latest\nRUN echo box\n"
        );
    }

    #[test]
    fn test_template_with_unknown_option_fails() {
        let values = BTreeMap::from([("image".to_string(), "x".to_string())]);
        let err = render_template("FROM {{image}}\nRUN {{nope}}\n", &values).unwrap_err();
        assert!(err.to_string().contains("'nope'"));
    }
}
