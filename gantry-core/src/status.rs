//! Session status state machine.
//!
//! Transitions are validated via [`SessionStatus::can_transition_to`]; any
//! pair not in the transition map is rejected by the entity layer with
//! `StateError::InvalidSessionTransition`.
//!
//! `PartiallyCompleted` is conditionally terminal: it may re-enter `Running`
//! to retry failed sub-tasks and then proceed to `Completed`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an orchestration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, awaiting execution
    Pending,
    /// In execution queue
    Queued,
    /// Actively executing
    Running,
    /// Manually paused
    Paused,
    /// Successfully finished
    Completed,
    /// Some sub-tasks succeeded
    PartiallyCompleted,
    /// Execution failed
    Failed,
    /// Exceeded max duration
    Timeout,
    /// Manually stopped
    Stopped,
    /// Cancelled before execution
    Cancelled,
    /// Lost parent/child relationship
    Orphaned,
    /// Running with reduced capacity
    Degraded,
}

impl SessionStatus {
    /// All states, in a stable order (useful for stats and property tests).
    pub const ALL: [SessionStatus; 12] = [
        SessionStatus::Pending,
        SessionStatus::Queued,
        SessionStatus::Running,
        SessionStatus::Paused,
        SessionStatus::Completed,
        SessionStatus::PartiallyCompleted,
        SessionStatus::Failed,
        SessionStatus::Timeout,
        SessionStatus::Stopped,
        SessionStatus::Cancelled,
        SessionStatus::Orphaned,
        SessionStatus::Degraded,
    ];

    /// Valid target states from this state.
    pub fn allowed_transitions(&self) -> &'static [SessionStatus] {
        use SessionStatus::*;
        match self {
            Pending => &[Queued, Cancelled, Failed],
            Queued => &[Running, Cancelled, Failed],
            Running => &[
                Completed,
                PartiallyCompleted,
                Failed,
                Timeout,
                Paused,
                Stopped,
                Degraded,
            ],
            Paused => &[Running, Stopped, Cancelled],
            Degraded => &[Running, Failed, Completed, Stopped],
            PartiallyCompleted => &[Running, Completed],
            // Terminal states
            Completed | Failed | Timeout | Stopped | Cancelled | Orphaned => &[],
        }
    }

    /// Check whether a transition to `target` is permitted.
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// States where the session is actively being processed.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionStatus::Queued
                | SessionStatus::Running
                | SessionStatus::Paused
                | SessionStatus::Degraded
        )
    }

    /// States from which no further transitions are allowed.
    ///
    /// `PartiallyCompleted` is excluded: the transition map permits it to
    /// resume, so treating it as terminal would desynchronize the two.
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// States indicating some form of failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SessionStatus::Failed
                | SessionStatus::Timeout
                | SessionStatus::Stopped
                | SessionStatus::Cancelled
                | SessionStatus::Orphaned
                | SessionStatus::Degraded
        )
    }

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Queued => "queued",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::PartiallyCompleted => "partially_completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Timeout => "timeout",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Orphaned => "orphaned",
            SessionStatus::Degraded => "degraded",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, SessionStatusParseError> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "queued" => Ok(SessionStatus::Queued),
            "running" => Ok(SessionStatus::Running),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "partially_completed" => Ok(SessionStatus::PartiallyCompleted),
            "failed" => Ok(SessionStatus::Failed),
            "timeout" => Ok(SessionStatus::Timeout),
            "stopped" => Ok(SessionStatus::Stopped),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "orphaned" => Ok(SessionStatus::Orphaned),
            "degraded" => Ok(SessionStatus::Degraded),
            _ => Err(SessionStatusParseError(s.to_string())),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for SessionStatus {
    type Err = SessionStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid session status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatusParseError(pub String);

impl fmt::Display for SessionStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid session status: {}", self.0)
    }
}

impl std::error::Error for SessionStatusParseError {}
