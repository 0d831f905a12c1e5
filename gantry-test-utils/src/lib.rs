//! GANTRY Test Utilities
//!
//! Entity factories and mock execution ports shared across the workspace's
//! test suites. The mocks record what they were asked to do and return
//! canned responses.

use async_trait::async_trait;
use gantry_core::{
    AgentCapability, AgentType, GantryResult, RegisteredAgent, Session, Task, Tenant, TenantId,
    TransportError,
};
use gantry_eap::{
    EapHeartbeat, EapResultStatus, EapStatus, EapTaskAssignment, EapTaskResult,
};
use gantry_engine::{ExecutionOutcome, ExecutionPort, ExternalAgentPort};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

// ============================================================================
// FACTORIES
// ============================================================================

/// A tenant with a descriptive name and the given concurrent-session quota.
pub fn tenant_with_quota(max_concurrent_sessions: i64) -> Tenant {
    let unique = uuid::Uuid::now_v7().simple().to_string();
    Tenant::new("Meridian Fabrication", &format!("meridian-{}", &unique[..8]))
        .unwrap_or_else(|e| panic!("tenant factory: {e}"))
        .with_max_concurrent_sessions(max_concurrent_sessions)
}

/// A pending execution session with a realistic title and prompt.
pub fn session(tenant_id: TenantId) -> Session {
    Session::new(tenant_id, "IMPL authentication", "Implement OAuth2")
        .unwrap_or_else(|e| panic!("session factory: {e}"))
}

/// A session configured to target the named agent.
pub fn session_for_agent(tenant_id: TenantId, agent_name: &str) -> Session {
    let mut agent_config = BTreeMap::new();
    agent_config.insert(agent_name.to_string(), json!({}));
    session(tenant_id).with_agent_config(agent_config)
}

/// A pending implementation task.
pub fn task(tenant_id: TenantId, session_id: gantry_core::SessionId) -> Task {
    Task::new(tenant_id, session_id, "Implement request handler")
        .unwrap_or_else(|e| panic!("task factory: {e}"))
}

/// An implementer agent with `code_generation` capability.
pub fn implementer_agent(tenant_id: TenantId, name: &str) -> RegisteredAgent {
    RegisteredAgent::new(
        tenant_id,
        name,
        AgentType::Implementer,
        HashSet::from([AgentCapability::CodeGeneration]),
        5,
    )
    .unwrap_or_else(|e| panic!("agent factory: {e}"))
}

/// An external agent with EAP endpoint metadata.
pub fn external_agent(
    tenant_id: TenantId,
    name: &str,
    endpoint_url: &str,
    auth_token: &str,
) -> RegisteredAgent {
    let mut metadata = BTreeMap::new();
    metadata.insert("is_external".to_string(), Value::Bool(true));
    metadata.insert("endpoint_url".to_string(), Value::from(endpoint_url));
    metadata.insert("auth_token".to_string(), Value::from(auth_token));
    implementer_agent(tenant_id, name).with_metadata(metadata)
}

// ============================================================================
// MOCK EXECUTION PORTS
// ============================================================================

/// Canned internal executor. Returns the configured outcome and records the
/// sessions it executed.
pub struct MockExecutionPort {
    outcome: Mutex<GantryResult<ExecutionOutcome>>,
    pub executed: Mutex<Vec<gantry_core::SessionId>>,
}

impl MockExecutionPort {
    /// Succeeds with a small diff payload.
    pub fn succeeding() -> Self {
        Self {
            outcome: Mutex::new(Ok(ExecutionOutcome {
                execution_id: "x".to_string(),
                result: json!({"message": "done"}),
                diff: json!({"files": ["auth.go"]}),
                metrics: json!({"api_calls": 3}),
            })),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Fails every execution with a connection error.
    pub fn failing(reason: &str) -> Self {
        Self {
            outcome: Mutex::new(Err(TransportError::Connection {
                endpoint: "workbench".to_string(),
                reason: reason.to_string(),
            }
            .into())),
            executed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ExecutionPort for MockExecutionPort {
    async fn execute(
        &self,
        session: &Session,
        _additional_prompt: Option<&str>,
    ) -> GantryResult<ExecutionOutcome> {
        self.executed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(session.id);
        self.outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Canned external agent. Returns the configured EAP result and records the
/// assignments it received.
pub struct MockExternalAgent {
    status: EapResultStatus,
    error_message: Option<String>,
    pub assignments: Mutex<Vec<EapTaskAssignment>>,
}

impl MockExternalAgent {
    pub fn completing() -> Self {
        Self {
            status: EapResultStatus::Completed,
            error_message: None,
            assignments: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error_message: &str) -> Self {
        Self {
            status: EapResultStatus::Failed,
            error_message: Some(error_message.to_string()),
            assignments: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ExternalAgentPort for MockExternalAgent {
    async fn send_task(
        &self,
        _endpoint_url: &str,
        _auth_token: &str,
        assignment: &EapTaskAssignment,
    ) -> GantryResult<EapTaskResult> {
        self.assignments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(assignment.clone());

        Ok(EapTaskResult {
            task_id: assignment.task_id,
            status: self.status,
            artifacts: Vec::new(),
            output_data: Some(json!({"echo": assignment.input_data})),
            execution_time_ms: 1200,
            tokens_used: 4200,
            cost_usd: 0.021,
            error_message: self.error_message.clone(),
        })
    }

    async fn check_health(&self, _endpoint_url: &str, _auth_token: &str) -> EapHeartbeat {
        EapHeartbeat {
            status: EapStatus::Available,
            current_load: 0.1,
            metrics: serde_json::Map::new(),
            timestamp: Some(chrono::Utc::now()),
        }
    }
}
