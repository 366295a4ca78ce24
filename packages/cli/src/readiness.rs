// ABOUTME: TCP readiness check waiting for the sandbox transport port to accept connections
// ABOUTME: Bounded retries with a fixed interval; sandboxes without a port are ready at once

use async_trait::async_trait;
use dockbox_driver::{DriverError, OrchestrationState, ReadinessCheck};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

const DEFAULT_ATTEMPTS: u32 = 30;
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct TcpReadinessCheck {
    attempts: u32,
    interval: Duration,
}

impl Default for TcpReadinessCheck {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl TcpReadinessCheck {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

#[async_trait]
impl ReadinessCheck for TcpReadinessCheck {
    async fn wait_until_ready(&self, state: &OrchestrationState) -> dockbox_driver::Result<()> {
        let (host, port) = match (&state.hostname, state.port) {
            (Some(host), Some(port)) => (host.clone(), port),
            _ => return Ok(()),
        };

        info!("Waiting for {}:{} to accept connections", host, port);
        for attempt in 1..=self.attempts {
            let connect = TcpStream::connect((host.as_str(), port));
            match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
                Ok(Ok(_)) => {
                    debug!("{}:{} reachable after {} attempt(s)", host, port, attempt);
                    return Ok(());
                }
                Ok(Err(e)) => debug!("Attempt {} failed: {}", attempt, e),
                Err(_) => debug!("Attempt {} timed out", attempt),
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(DriverError::EngineUnavailable(format!(
            "Sandbox transport {}:{} not reachable after {} attempts",
            host, port, self.attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_ready_when_port_accepts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = OrchestrationState {
            hostname: Some("127.0.0.1".to_string()),
            port: Some(port),
            ..Default::default()
        };
        TcpReadinessCheck::new(2, Duration::from_millis(10))
            .wait_until_ready(&state)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let state = OrchestrationState {
            hostname: Some("127.0.0.1".to_string()),
            port: Some(port),
            ..Default::default()
        };
        let err = TcpReadinessCheck::new(2, Duration::from_millis(10))
            .wait_until_ready(&state)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::EngineUnavailable(_)));
    }

    #[tokio::test]
    async fn test_no_port_is_ready() {
        let state = OrchestrationState {
            hostname: Some("localhost".to_string()),
            ..Default::default()
        };
        TcpReadinessCheck::default()
            .wait_until_ready(&state)
            .await
            .unwrap();
    }
}
