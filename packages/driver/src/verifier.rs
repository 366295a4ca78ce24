// ABOUTME: Connection options handed to an external verification tool
// ABOUTME: The docker backend targets the container id directly instead of SSH

use crate::error::Result;
use crate::state::OrchestrationState;
use serde_json::{json, Value};
use tracing::info;

pub trait RunnerOptions {
    fn runner_options(&self, state: &OrchestrationState) -> Result<Value>;
}

/// `{"backend": "docker", "host": <container id>}`
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerRunnerOptions;

impl RunnerOptions for DockerRunnerOptions {
    fn runner_options(&self, state: &OrchestrationState) -> Result<Value> {
        let container_id = state.require_container("runner options")?;
        info!("Docker backend target container {}", container_id);
        Ok(json!({
            "backend": "docker",
            "host": container_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;

    #[test]
    fn test_docker_backend_options() {
        let state = OrchestrationState {
            container_id: Some("0123456789ab".to_string()),
            ..Default::default()
        };
        let options = DockerRunnerOptions.runner_options(&state).unwrap();
        assert_eq!(options, json!({"backend": "docker", "host": "0123456789ab"}));
    }

    #[test]
    fn test_requires_container() {
        let err = DockerRunnerOptions
            .runner_options(&OrchestrationState::default())
            .unwrap_err();
        assert!(matches!(err, DriverError::InconsistentState(_)));
    }
}
