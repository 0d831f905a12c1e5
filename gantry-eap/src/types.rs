//! EAP v1 wire types.
//!
//! The orchestrator POSTs an `EapTaskAssignment` to `{endpoint_url}/task`
//! with an `X-Agent-Token` header and receives an `EapTaskResult`. Agents
//! push heartbeats; `EapHeartbeat` doubles as the `GET /health` probe body.

use chrono::{DateTime, Utc};
use gantry_core::{SessionId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Agent-reported liveness status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EapStatus {
    Available,
    Busy,
    Degraded,
    Offline,
}

/// Terminal outcome of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EapResultStatus {
    Completed,
    Failed,
}

/// A work unit dispatched to an external agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EapTaskAssignment {
    pub task_id: TaskId,
    pub session_id: SessionId,
    /// e.g. "session_execution"
    pub task_type: String,
    /// Serialized session context
    pub context: Value,
    /// Prompt / input payload
    pub input_data: String,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// An artifact produced by an external agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EapArtifact {
    pub name: String,
    /// e.g. "file", "diff", "report"
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// The agent's response to a task assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EapTaskResult {
    pub task_id: TaskId,
    pub status: EapResultStatus,
    #[serde(default)]
    pub artifacts: Vec<EapArtifact>,
    #[serde(default)]
    pub output_data: Option<Value>,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl EapTaskResult {
    pub fn is_completed(&self) -> bool {
        self.status == EapResultStatus::Completed
    }
}

/// Heartbeat pushed by agents; also the shape of the health probe response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EapHeartbeat {
    pub status: EapStatus,
    /// Utilization in [0, 1]
    pub current_load: f64,
    #[serde(default)]
    pub metrics: Map<String, Value>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EapHeartbeat {
    /// Synthesized heartbeat for an unreachable agent.
    pub fn offline(reason: &str) -> Self {
        let mut metrics = Map::new();
        metrics.insert("error".into(), Value::from(reason));
        Self {
            status: EapStatus::Offline,
            current_load: 0.0,
            metrics,
            timestamp: Some(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::EntityIdType;
    use serde_json::json;

    #[test]
    fn test_assignment_wire_format() {
        let assignment = EapTaskAssignment {
            task_id: TaskId::now_v7(),
            session_id: SessionId::now_v7(),
            task_type: "session_execution".into(),
            context: json!({"title": "IMPL auth"}),
            input_data: "Implement OAuth2".into(),
            requirements: vec!["rust".into()],
        };
        let wire = serde_json::to_value(&assignment).expect("serialize");
        assert_eq!(wire["task_type"], "session_execution");
        assert_eq!(wire["input_data"], "Implement OAuth2");
    }

    #[test]
    fn test_result_status_snake_case() {
        let json = json!({
            "task_id": TaskId::now_v7().to_string(),
            "status": "failed",
            "execution_time_ms": 1500,
            "error_message": "model timeout",
        });
        let result: EapTaskResult = serde_json::from_value(json).expect("deserialize");
        assert_eq!(result.status, EapResultStatus::Failed);
        assert!(!result.is_completed());
        assert_eq!(result.error_message.as_deref(), Some("model timeout"));
        assert_eq!(result.tokens_used, 0);
    }

    #[test]
    fn test_offline_heartbeat_carries_reason() {
        let heartbeat = EapHeartbeat::offline("connection refused");
        assert_eq!(heartbeat.status, EapStatus::Offline);
        assert_eq!(
            heartbeat.metrics.get("error"),
            Some(&Value::from("connection refused"))
        );
    }
}
