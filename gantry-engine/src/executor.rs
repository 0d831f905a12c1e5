//! Session executor: end-to-end orchestration of one session.
//!
//! Resolves the target agent from `agent_config`, starts the session under
//! its execution lock, dispatches to the internal executor or an external
//! EAP agent, and settles the session with the aggregated result. Any
//! dispatch failure is recorded as a retryable session failure with context
//! `{source, agent}`.

use crate::ports::{ExecutionPort, ExternalAgentPort};
use crate::session_service::SessionService;
use crate::tenancy::RequestContext;
use gantry_core::{
    EntityIdType, GantryError, GantryResult, NotFoundError, RegisteredAgent, Session, SessionId,
    TaskId, TransportError, ValidationError,
};
use gantry_eap::EapTaskAssignment;
use gantry_registry::AgentRegistry;
use gantry_storage::AgentStore;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reserved key in `agent_config` naming the fallback agent.
const DEFAULT_AGENT_KEY: &str = "default_agent";

/// Orchestrates a single session end-to-end.
pub struct SessionExecutor {
    sessions: Arc<SessionService>,
    agents: Arc<dyn AgentStore>,
    registry: Arc<AgentRegistry>,
    external: Arc<dyn ExternalAgentPort>,
    internal: Arc<dyn ExecutionPort>,
}

impl SessionExecutor {
    pub fn new(
        sessions: Arc<SessionService>,
        agents: Arc<dyn AgentStore>,
        registry: Arc<AgentRegistry>,
        external: Arc<dyn ExternalAgentPort>,
        internal: Arc<dyn ExecutionPort>,
    ) -> Self {
        Self {
            sessions,
            agents,
            registry,
            external,
            internal,
        }
    }

    /// Execute a session to completion. Returns the session result payload.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
        additional_prompt: Option<&str>,
    ) -> GantryResult<Value> {
        let tenant_id = ctx.require_tenant("execute_session")?;
        let session = self
            .sessions
            .get_session(ctx, session_id, false)
            .await?
            .ok_or(NotFoundError::Session(session_id))?;

        let agent_name = resolve_agent_name(&session);
        let agent = match &agent_name {
            Some(name) => self.agents.get_by_name(name, tenant_id).await?,
            None => None,
        };

        self.sessions.start_session(ctx, session_id).await?;

        // Cancellation is observed at suspension points; a request cancelled
        // before dispatch surfaces as a retryable failure.
        if ctx.is_cancelled() {
            let mut context = BTreeMap::new();
            context.insert("source".to_string(), Value::from("agent_execution"));
            self.sessions
                .fail_session(
                    ctx,
                    session_id,
                    "CancelledError",
                    "request cancelled before dispatch",
                    context,
                    true,
                )
                .await?;
            return Err(TransportError::Connection {
                endpoint: "dispatch".into(),
                reason: "request cancelled".into(),
            }
            .into());
        }

        if let Some(agent) = &agent {
            self.registry.increment_task_count(agent.id);
        }

        let dispatch = self
            .dispatch(ctx, &session, agent.as_ref(), additional_prompt)
            .await;

        if let Some(agent) = &agent {
            self.registry.decrement_task_count(agent.id);
        }

        match dispatch {
            Ok(result) => Ok(result),
            Err(error) => {
                let mut context = BTreeMap::new();
                context.insert("source".to_string(), Value::from("agent_execution"));
                if let Some(name) = &agent_name {
                    context.insert("agent".to_string(), Value::from(name.clone()));
                }
                self.sessions
                    .fail_session(
                        ctx,
                        session_id,
                        error_type_of(&error),
                        &error.to_string(),
                        context,
                        true,
                    )
                    .await?;
                Err(error)
            }
        }
    }

    async fn dispatch(
        &self,
        ctx: &RequestContext,
        session: &Session,
        agent: Option<&RegisteredAgent>,
        additional_prompt: Option<&str>,
    ) -> GantryResult<Value> {
        match agent {
            Some(agent) if agent.is_external() => {
                self.dispatch_external(ctx, session, agent, additional_prompt)
                    .await
            }
            _ => self.dispatch_internal(ctx, session, additional_prompt).await,
        }
    }

    async fn dispatch_external(
        &self,
        ctx: &RequestContext,
        session: &Session,
        agent: &RegisteredAgent,
        additional_prompt: Option<&str>,
    ) -> GantryResult<Value> {
        let endpoint_url = agent.endpoint_url().ok_or_else(|| {
            GantryError::Validation(ValidationError::RequiredFieldMissing {
                field: "metadata.endpoint_url".into(),
            })
        })?;
        let auth_token = agent.auth_token().ok_or_else(|| {
            GantryError::Validation(ValidationError::RequiredFieldMissing {
                field: "metadata.auth_token".into(),
            })
        })?;

        let input_data = match additional_prompt {
            Some(extra) => format!("{}\n\n{extra}", session.initial_prompt),
            None => session.initial_prompt.clone(),
        };
        let assignment = EapTaskAssignment {
            task_id: TaskId::now_v7(),
            session_id: session.id,
            task_type: "session_execution".to_string(),
            context: serde_json::to_value(session).unwrap_or(Value::Null),
            input_data,
            requirements: session.tags.clone(),
        };

        tracing::info!(
            session_id = %session.id,
            agent = agent.name.as_str(),
            endpoint = endpoint_url,
            "dispatching session to external agent"
        );
        let eap_result = self
            .external
            .send_task(endpoint_url, auth_token, &assignment)
            .await?;

        if !eap_result.is_completed() {
            return Err(TransportError::ExternalAgentFailed {
                message: eap_result
                    .error_message
                    .unwrap_or_else(|| "external agent reported failure".to_string()),
            }
            .into());
        }

        let result = json!({
            "success": true,
            "session_id": session.id.to_string(),
            "artifacts": eap_result.artifacts,
            "output": eap_result.output_data,
            "metrics": {
                "execution_time_ms": eap_result.execution_time_ms,
                "tokens_used": eap_result.tokens_used,
                "cost_usd": eap_result.cost_usd,
            },
        });

        self.sessions
            .complete_session(ctx, session.id, result.clone(), 1.0, Some(0.9))
            .await?;
        Ok(result)
    }

    async fn dispatch_internal(
        &self,
        ctx: &RequestContext,
        session: &Session,
        additional_prompt: Option<&str>,
    ) -> GantryResult<Value> {
        tracing::info!(session_id = %session.id, "dispatching session to internal executor");
        let outcome = self.internal.execute(session, additional_prompt).await?;

        let result = json!({
            "success": true,
            "session_id": session.id.to_string(),
            "native_execution_id": outcome.execution_id,
            "result": outcome.result,
            "diff": outcome.diff,
            "metrics": outcome.metrics,
        });

        self.sessions
            .complete_session(ctx, session.id, result.clone(), 1.0, Some(0.9))
            .await?;
        Ok(result)
    }
}

/// Resolve the target agent name from `agent_config`: the first
/// non-reserved key, else the `default_agent` entry.
pub fn resolve_agent_name(session: &Session) -> Option<String> {
    if let Some(name) = session
        .agent_config
        .keys()
        .find(|k| k.as_str() != DEFAULT_AGENT_KEY)
    {
        return Some(name.clone());
    }
    session
        .agent_config
        .get(DEFAULT_AGENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn error_type_of(error: &GantryError) -> &'static str {
    match error {
        GantryError::Transport(_) => "RuntimeError",
        GantryError::Validation(_) => "ValidationError",
        GantryError::State(_) => "StateError",
        GantryError::Lock(_) => "LockError",
        _ => "ExecutionError",
    }
}
