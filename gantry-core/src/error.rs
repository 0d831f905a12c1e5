//! Error types for GANTRY operations.
//!
//! The taxonomy is organized by kind: validation and state errors surface to
//! the caller verbatim, concurrency and transport errors are retried where
//! meaningful, capacity errors carry the offending resource and limit.

use crate::identity::{AgentId, ContextId, SessionId, TaskId, TenantId};
use crate::status::SessionStatus;
use crate::{AgentCapability, FineTuningStatus, TaskStatus};
use thiserror::Error;

/// Validation errors. Never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Title '{title}' is too generic; use descriptive naming")]
    GenericTitle { title: String },

    #[error("Task title '{title}' must start with an action verb")]
    NonActionableTitle { title: String },

    #[error("Value for {field} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Malformed tenant id: {input}")]
    MalformedTenantId { input: String },

    #[error("Tenant context required for {operation}")]
    MissingTenant { operation: String },
}

/// Illegal state-machine transitions. Non-retryable at the call site.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    #[error("Invalid transition from {current} to {target} for session {session_id}: {}", .reason.as_deref().unwrap_or("transition not permitted"))]
    InvalidSessionTransition {
        session_id: SessionId,
        current: SessionStatus,
        target: SessionStatus,
        reason: Option<String>,
    },

    #[error("Invalid transition from {current:?} to {target:?} for task {task_id}")]
    InvalidTaskTransition {
        task_id: TaskId,
        current: TaskStatus,
        target: TaskStatus,
    },

    #[error("Invalid fine-tuning transition from {current:?} to {target:?}")]
    InvalidFineTuningTransition {
        current: FineTuningStatus,
        target: FineTuningStatus,
    },

    #[error("Session {session_id} is not recoverable")]
    SessionNotRecoverable { session_id: SessionId },
}

/// Optimistic-concurrency failures. The caller reloads and retries.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConcurrencyError {
    #[error("Optimistic lock failure on {entity}: expected version {expected}, found {actual}")]
    OptimisticLock {
        entity: String,
        expected: i64,
        actual: i64,
    },

    #[error("Context version conflict for {context_id}: expected version {expected}, found {actual}")]
    ContextConflict {
        context_id: ContextId,
        expected: i64,
        actual: i64,
        conflicting_keys: Vec<String>,
    },
}

/// Task-graph failures. Fatal to the decomposition attempt; the task stays
/// in its pre-decomposition state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskGraphError {
    #[error("Task dependency cycle detected: {path:?}")]
    DependencyCycle { path: Vec<TaskId> },

    #[error("Task {task_id} cannot depend on itself")]
    SelfDependency { task_id: TaskId },

    #[error("Dependency from {task_id} on {target_id} already exists")]
    DuplicateDependency { task_id: TaskId, target_id: TaskId },

    #[error("Task hierarchy depth {depth} exceeds the limit of {limit}")]
    ComplexityOverflow { depth: usize, limit: usize },

    #[error("Decomposition failed: {reason}")]
    DecompositionFailed { reason: String },
}

/// Capacity and quota failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapacityError {
    #[error("Quota exceeded for {resource}: limit is {limit}")]
    QuotaExceeded { resource: String, limit: i64 },

    #[error("Agent {agent_id} is overloaded ({current}/{max} tasks)")]
    AgentOverloaded {
        agent_id: AgentId,
        current: i32,
        max: i32,
    },

    #[error("Agent {agent_id} missing required capabilities: {missing:?}")]
    AgentCapabilityMismatch {
        agent_id: AgentId,
        missing: Vec<AgentCapability>,
    },

    #[error("No suitable agent for capabilities {required:?}")]
    NoSuitableAgent { required: Vec<AgentCapability> },
}

/// Distributed-lock failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LockError {
    #[error("Failed to acquire lock on {resource}: {reason}")]
    Acquisition { resource: String, reason: String },

    #[error("Timed out after {waited_ms}ms acquiring lock on {resource}")]
    Timeout { resource: String, waited_ms: u64 },

    #[error("Lock on {resource} is not owned by {owner}")]
    NotOwned { resource: String, owner: String },

    #[error("Deadlock detected while waiting for {resource}")]
    DeadlockDetected { resource: String },

    #[error("Lease on {resource} was lost (renewal failed)")]
    LeaseLost { resource: String },
}

/// Transport failures: EAP dispatch and internal-executor calls.
/// Subject to the per-client retry policies.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("{endpoint} returned status {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("External agent failed: {message}")]
    ExternalAgentFailed { message: String },

    #[error("Execution {execution_id} not found on internal executor")]
    ExecutionNotFound { execution_id: String },
}

/// Not-found failures: null-equivalent for reads, raised for writes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NotFoundError {
    #[error("Session not found: {0}")]
    Session(SessionId),

    #[error("Task not found: {0}")]
    Task(TaskId),

    #[error("Agent not found: {0}")]
    Agent(AgentId),

    #[error("Tenant not found: {0}")]
    Tenant(TenantId),

    #[error("Context not found: {0}")]
    Context(ContextId),

    #[error("Entity not found: {entity} {id}")]
    Entity { entity: String, id: String },
}

/// Storage-layer failures not covered by concurrency or not-found kinds.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("Insert failed for {entity}: {reason}")]
    InsertFailed { entity: String, reason: String },

    #[error("Update failed for {entity}: {reason}")]
    UpdateFailed { entity: String, reason: String },

    #[error("Storage backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Master error type for all GANTRY operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GantryError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    #[error("Task graph error: {0}")]
    TaskGraph(#[from] TaskGraphError),

    #[error("Capacity error: {0}")]
    Capacity(#[from] CapacityError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl GantryError {
    /// Stable kind tag for structured error reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            GantryError::Validation(_) => "validation",
            GantryError::State(_) => "state",
            GantryError::Concurrency(_) => "concurrency",
            GantryError::TaskGraph(_) => "task_graph",
            GantryError::Capacity(_) => "capacity",
            GantryError::Lock(_) => "lock",
            GantryError::Transport(_) => "transport",
            GantryError::NotFound(_) => "not_found",
            GantryError::Storage(_) => "storage",
        }
    }

    /// Whether a higher layer may meaningfully retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GantryError::Concurrency(_)
                | GantryError::Transport(_)
                | GantryError::Lock(LockError::Timeout { .. })
                | GantryError::Storage(StorageError::Unavailable { .. })
        )
    }
}

/// Result type alias for GANTRY operations.
pub type GantryResult<T> = Result<T, GantryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityIdType;

    #[test]
    fn test_error_kind_tags() {
        let err: GantryError = ValidationError::RequiredFieldMissing {
            field: "title".into(),
        }
        .into();
        assert_eq!(err.kind(), "validation");
        assert!(!err.is_retryable());

        let err: GantryError = TransportError::Connection {
            endpoint: "http://x/agent".into(),
            reason: "refused".into(),
        }
        .into();
        assert_eq!(err.kind(), "transport");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_quota_error_message() {
        let err = CapacityError::QuotaExceeded {
            resource: "concurrent_sessions".into(),
            limit: 1,
        };
        assert_eq!(
            err.to_string(),
            "Quota exceeded for concurrent_sessions: limit is 1"
        );
    }

    #[test]
    fn test_invalid_transition_message_includes_reason() {
        let id = SessionId::nil();
        let err = StateError::InvalidSessionTransition {
            session_id: id,
            current: SessionStatus::Completed,
            target: SessionStatus::Running,
            reason: Some("terminal state".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("running"));
        assert!(msg.contains("terminal state"));
    }
}
