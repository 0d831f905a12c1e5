//! Execution ports the session executor multiplexes over.
//!
//! `ExecutionPort` drives the internal native executor; `ExternalAgentPort`
//! is the EAP surface. The executor branches on the resolved agent's
//! `is_external` metadata.

use async_trait::async_trait;
use gantry_core::{GantryResult, Session};
use gantry_eap::{EapClient, EapHeartbeat, EapTaskAssignment, EapTaskResult};
use serde_json::Value;

/// Result of one internal execution run.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The native executor's own execution id
    pub execution_id: String,
    /// Raw message/result payload
    pub result: Value,
    /// Final diff produced by the execution
    pub diff: Value,
    /// Executor-side metrics (api calls, timing)
    pub metrics: Value,
}

/// Internal (process-local) executor port.
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    /// Create a native execution for the session, feed it the prompt, poll
    /// until it settles, and fetch the final diff.
    async fn execute(
        &self,
        session: &Session,
        additional_prompt: Option<&str>,
    ) -> GantryResult<ExecutionOutcome>;
}

/// External agent dispatch port (EAP).
#[async_trait]
pub trait ExternalAgentPort: Send + Sync {
    async fn send_task(
        &self,
        endpoint_url: &str,
        auth_token: &str,
        assignment: &EapTaskAssignment,
    ) -> GantryResult<EapTaskResult>;

    async fn check_health(&self, endpoint_url: &str, auth_token: &str) -> EapHeartbeat;
}

#[async_trait]
impl ExternalAgentPort for EapClient {
    async fn send_task(
        &self,
        endpoint_url: &str,
        auth_token: &str,
        assignment: &EapTaskAssignment,
    ) -> GantryResult<EapTaskResult> {
        EapClient::send_task(self, endpoint_url, auth_token, assignment).await
    }

    async fn check_health(&self, endpoint_url: &str, auth_token: &str) -> EapHeartbeat {
        EapClient::check_health(self, endpoint_url, auth_token).await
    }
}
