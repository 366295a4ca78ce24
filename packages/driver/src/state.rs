// ABOUTME: Per-sandbox record of identifiers and endpoints produced during creation
// ABOUTME: Serializable so the host can persist it between create, execute and destroy

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Absent,
    ImageBuilt,
    ContainerRunning,
    Ready,
}

impl OrchestrationState {
    pub fn stage(&self) -> LifecycleStage {
        match (&self.image_id, &self.container_id, &self.hostname) {
            (_, Some(_), Some(_)) => LifecycleStage::Ready,
            (_, Some(_), None) => LifecycleStage::ContainerRunning,
            (Some(_), None, _) => LifecycleStage::ImageBuilt,
            (None, None, _) => LifecycleStage::Absent,
        }
    }

    /// Container id, or an error naming the operation that needed it
    pub fn require_container(&self, operation: &str) -> crate::Result<&str> {
        self.container_id.as_deref().ok_or_else(|| {
            crate::DriverError::InconsistentState(format!(
                "{} requires a container but none is recorded",
                operation
            ))
        })
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progression() {
        let mut state = OrchestrationState::default();
        assert_eq!(state.stage(), LifecycleStage::Absent);

        state.image_id = Some("abc123".to_string());
        assert_eq!(state.stage(), LifecycleStage::ImageBuilt);

        state.container_id = Some("0123456789ab".to_string());
        assert_eq!(state.stage(), LifecycleStage::ContainerRunning);

        state.hostname = Some("localhost".to_string());
        state.port = Some(32768);
        assert_eq!(state.stage(), LifecycleStage::Ready);

        state.clear();
        assert_eq!(state.stage(), LifecycleStage::Absent);
    }

    #[test]
    fn test_serialization_skips_unset_fields() {
        let state = OrchestrationState {
            container_id: Some("0123456789ab".to_string()),
            port: Some(22),
            ..Default::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"container_id":"0123456789ab","port":22}"#);

        let parsed: OrchestrationState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_require_container() {
        let state = OrchestrationState::default();
        assert!(matches!(
            state.require_container("execute"),
            Err(crate::DriverError::InconsistentState(_))
        ));
    }
}
