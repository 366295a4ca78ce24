// ABOUTME: Tests for engine unavailability on both execution channels
// ABOUTME: A missing daemon or binary must surface as EngineUnavailable, never a panic

use dockbox_driver::{
    ApiChannel, ChannelKind, CliChannel, DriverConfig, DriverError, ExecutionChannel, Instance,
};
use std::sync::Arc;

fn resolved(config: DriverConfig) -> Arc<dockbox_driver::ResolvedConfig> {
    Arc::new(
        DriverConfig {
            instance_name: Some("unreachable".to_string()),
            ..config
        }
        .resolve(&Instance {
            name: "unreachable".to_string(),
            platform_name: "ubuntu-22.04".to_string(),
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn test_api_channel_reports_missing_daemon() {
    let config = resolved(DriverConfig {
        channel: ChannelKind::Api,
        socket: Some("unix:///nonexistent/dockbox/docker.sock".to_string()),
        ..Default::default()
    });

    match ApiChannel::connect(config) {
        Err(e) => assert!(matches!(e, DriverError::EngineUnavailable(_))),
        Ok(channel) => {
            let err = channel.verify().await.unwrap_err();
            assert!(
                matches!(err, DriverError::EngineUnavailable(_)),
                "unexpected error: {}",
                err
            );
            assert!(err.to_string().contains("docker.sock"));
        }
    }
}

#[tokio::test]
async fn test_api_channel_rejects_tls() {
    let config = resolved(DriverConfig {
        channel: ChannelKind::Api,
        socket: Some("tcp://127.0.0.1:2376".to_string()),
        tls_verify: true,
        ..Default::default()
    });
    assert!(matches!(
        ApiChannel::connect(config),
        Err(DriverError::Configuration(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_cli_channel_reports_missing_binary() {
    let config = resolved(DriverConfig {
        binary: "dockbox-no-such-engine-binary".to_string(),
        socket: Some("unix:///var/run/docker.sock".to_string()),
        ..Default::default()
    });
    let err = CliChannel::new(config).verify().await.unwrap_err();
    match err {
        DriverError::EngineUnavailable(message) => {
            assert!(message.contains("install the Docker CLI"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
