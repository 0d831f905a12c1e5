//! Domain events emitted by session transitions.
//!
//! Events are returned from the mutating entity methods and published by the
//! engine's event bus; entities never accumulate hidden event state.

use crate::identity::{SessionId, Timestamp};
use crate::status::SessionStatus;
use crate::SessionType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Session lifecycle events, emitted in causal order per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A new session was persisted.
    Created {
        session_id: SessionId,
        title: String,
        session_type: SessionType,
        created_by: Option<String>,
        timestamp: Timestamp,
    },

    /// A validated status transition was committed.
    StatusChanged {
        session_id: SessionId,
        old_status: SessionStatus,
        new_status: SessionStatus,
        timestamp: Timestamp,
    },

    /// The session reached `completed`.
    Completed {
        session_id: SessionId,
        result: Value,
        success_rate: f64,
        execution_duration_seconds: Option<f64>,
        timestamp: Timestamp,
    },

    /// The session reached `failed`.
    Failed {
        session_id: SessionId,
        error_type: String,
        error_message: String,
        error_context: BTreeMap<String, Value>,
        retryable: bool,
        timestamp: Timestamp,
    },
}

impl SessionEvent {
    /// Event type name for logging and subscription filters.
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Created { .. } => "SessionCreated",
            SessionEvent::StatusChanged { .. } => "SessionStatusChanged",
            SessionEvent::Completed { .. } => "SessionCompleted",
            SessionEvent::Failed { .. } => "SessionFailed",
        }
    }

    /// The session this event belongs to.
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::Created { session_id, .. }
            | SessionEvent::StatusChanged { session_id, .. }
            | SessionEvent::Completed { session_id, .. }
            | SessionEvent::Failed { session_id, .. } => *session_id,
        }
    }
}
