//! Async repository ports, one small trait per entity.
//!
//! Reads of missing entities return `Ok(None)`; writes against missing
//! entities fail with a not-found error. Updates enforce strict optimistic
//! versioning: the stored row must still carry the version the caller read,
//! and the committed row carries exactly `version + 1`.

use async_trait::async_trait;
use gantry_context::ExecutionContext;
use gantry_core::{
    AgentCapability, AgentId, Checkpoint, ContextId, ContextScope, FineTuningJob, GantryResult,
    JobId, RegisteredAgent, Session, SessionId, SessionPriority, SessionStatus, SessionType,
    Task, TaskId, Tenant, TenantId,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Shared pagination options.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub limit: usize,
    pub offset: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Filters for session listing.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub session_type: Option<SessionType>,
    pub priority: Option<SessionPriority>,
    pub created_by: Option<String>,
    pub tags: Vec<String>,
}

/// Aggregate session statistics for a tenant.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
    pub by_type: HashMap<String, usize>,
}

/// Session persistence port.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. Maintains the parent's denormalized
    /// `child_ids` when `parent_id` is set.
    async fn insert(&self, session: &Session) -> GantryResult<()>;

    /// Point lookup; soft-deleted rows are invisible.
    async fn get(&self, id: SessionId, tenant_id: TenantId) -> GantryResult<Option<Session>>;

    /// Commit an updated session. The stored version must equal
    /// `session.version`; the committed row carries `session.version + 1`.
    /// Returns the committed entity.
    async fn update(&self, session: &Session) -> GantryResult<Session>;

    /// Soft delete, removing the id from the parent's `child_ids`.
    async fn soft_delete(&self, id: SessionId, tenant_id: TenantId) -> GantryResult<()>;

    /// Number of sessions in an active status for the tenant.
    async fn count_active_by_tenant(&self, tenant_id: TenantId) -> GantryResult<usize>;

    /// Filtered, paginated listing.
    async fn find(
        &self,
        tenant_id: TenantId,
        filter: &SessionFilter,
        options: QueryOptions,
    ) -> GantryResult<Vec<Session>>;

    /// All sessions in an active status for the tenant.
    async fn find_active(&self, tenant_id: TenantId) -> GantryResult<Vec<Session>>;

    /// Direct children of a session.
    async fn children(
        &self,
        parent_id: SessionId,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<Session>>;

    /// Append a checkpoint; the store assigns the next sequence (gapless
    /// within a store, starting at 1).
    async fn add_checkpoint(
        &self,
        session_id: SessionId,
        tenant_id: TenantId,
        data: Value,
        metadata: BTreeMap<String, Value>,
    ) -> GantryResult<Checkpoint>;

    /// All checkpoints for a session, ordered by sequence.
    async fn checkpoints(
        &self,
        session_id: SessionId,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<Checkpoint>>;

    /// Aggregate statistics for the tenant.
    async fn stats(&self, tenant_id: TenantId) -> GantryResult<SessionStats>;
}

/// Durable agent registration port.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn register(&self, agent: &RegisteredAgent) -> GantryResult<()>;

    async fn get(&self, id: AgentId, tenant_id: TenantId) -> GantryResult<Option<RegisteredAgent>>;

    async fn get_by_name(
        &self,
        name: &str,
        tenant_id: TenantId,
    ) -> GantryResult<Option<RegisteredAgent>>;

    async fn update(&self, agent: &RegisteredAgent) -> GantryResult<()>;

    async fn deregister(&self, id: AgentId, tenant_id: TenantId) -> GantryResult<bool>;

    /// Available agents holding one capability.
    async fn find_by_capability(
        &self,
        capability: AgentCapability,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<RegisteredAgent>>;

    /// All available agents for the tenant.
    async fn find_available(&self, tenant_id: TenantId) -> GantryResult<Vec<RegisteredAgent>>;

    /// Refresh the durable heartbeat timestamp.
    async fn heartbeat(&self, id: AgentId, tenant_id: TenantId) -> GantryResult<bool>;
}

/// Tenant persistence port.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn insert(&self, tenant: &Tenant) -> GantryResult<()>;

    async fn get(&self, id: TenantId) -> GantryResult<Option<Tenant>>;

    async fn get_by_slug(&self, slug: &str) -> GantryResult<Option<Tenant>>;
}

/// Task persistence port.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &Task) -> GantryResult<()>;

    async fn get(&self, id: TaskId, tenant_id: TenantId) -> GantryResult<Option<Task>>;

    async fn update(&self, task: &Task) -> GantryResult<()>;

    async fn list_by_session(
        &self,
        session_id: SessionId,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<Task>>;
}

/// Execution-context persistence port.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn insert(&self, context: &ExecutionContext) -> GantryResult<()>;

    async fn get(
        &self,
        id: ContextId,
        tenant_id: TenantId,
    ) -> GantryResult<Option<ExecutionContext>>;

    /// Apply dot-path updates iff the stored version equals
    /// `expected_version`; a mismatch fails with `ContextConflict` carrying
    /// the update keys. Returns the committed context.
    async fn update(
        &self,
        id: ContextId,
        tenant_id: TenantId,
        updates: BTreeMap<String, Value>,
        expected_version: i64,
    ) -> GantryResult<ExecutionContext>;

    async fn delete(&self, id: ContextId, tenant_id: TenantId) -> GantryResult<bool>;

    async fn find_by_scope(
        &self,
        scope: ContextScope,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<ExecutionContext>>;

    async fn find_by_session(
        &self,
        session_id: SessionId,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<ExecutionContext>>;

    /// Drop temporary contexts older than their TTL. Returns the number
    /// removed.
    async fn cleanup_expired_temporary(&self, tenant_id: TenantId) -> GantryResult<usize>;
}

/// Fine-tuning job persistence port.
#[async_trait]
pub trait FineTuningStore: Send + Sync {
    async fn insert(&self, job: &FineTuningJob) -> GantryResult<()>;

    async fn get(&self, id: JobId, tenant_id: TenantId) -> GantryResult<Option<FineTuningJob>>;

    async fn update(&self, job: &FineTuningJob) -> GantryResult<()>;

    async fn list_by_tenant(&self, tenant_id: TenantId) -> GantryResult<Vec<FineTuningJob>>;
}
