//! Shared enumerations for GANTRY entities.
//!
//! Every enum that crosses the storage boundary carries `as_db_str` /
//! `from_db_str` plus `Display`/`FromStr`, with a dedicated parse-error type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! impl_db_string_enum {
    ($name:ident, $err:ident, { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $name {
            /// Convert to database string representation.
            pub fn as_db_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $str, )+
                }
            }

            /// Parse from database string representation.
            pub fn from_db_str(s: &str) -> Result<Self, $err> {
                match s {
                    $( $str => Ok($name::$variant), )+
                    _ => Err($err(s.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_db_str())
            }
        }

        impl FromStr for $name {
            type Err = $err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_db_str(s)
            }
        }

        #[doc = concat!("Error when parsing an invalid `", stringify!($name), "` string.")]
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $err(pub String);

        impl fmt::Display for $err {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "Invalid {}: {}", stringify!($name), self.0)
            }
        }

        impl std::error::Error for $err {}
    };
}

// ============================================================================
// SESSION CLASSIFICATION
// ============================================================================

/// Type of orchestration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Planning,
    Execution,
    Review,
    Debug,
    Integration,
}

impl Default for SessionType {
    fn default() -> Self {
        SessionType::Execution
    }
}

impl_db_string_enum!(SessionType, SessionTypeParseError, {
    Planning => "planning",
    Execution => "execution",
    Review => "review",
    Debug => "debug",
    Integration => "integration",
});

/// Execution priority level. Lower rank is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPriority {
    /// Blocking failures, immediate attention
    Critical,
    /// Core path, user-blocking
    High,
    /// Important but can wait
    Medium,
    /// Background, non-urgent
    Low,
    /// Can be scheduled later
    Deferred,
}

impl Default for SessionPriority {
    fn default() -> Self {
        SessionPriority::Medium
    }
}

impl SessionPriority {
    /// Numeric rank (0 = most urgent), matching the queue ordering.
    pub fn rank(&self) -> u8 {
        match self {
            SessionPriority::Critical => 0,
            SessionPriority::High => 1,
            SessionPriority::Medium => 2,
            SessionPriority::Low => 3,
            SessionPriority::Deferred => 4,
        }
    }
}

impl_db_string_enum!(SessionPriority, SessionPriorityParseError, {
    Critical => "critical",
    High => "high",
    Medium => "medium",
    Low => "low",
    Deferred => "deferred",
});

// ============================================================================
// TASK CLASSIFICATION
// ============================================================================

/// Task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not started
    Pending,
    /// Dependencies satisfied, ready to start
    Ready,
    /// Assigned to agent, not started
    Assigned,
    /// Currently being worked on
    InProgress,
    /// Blocked by external factor
    Blocked,
    /// Manually paused
    Paused,
    /// Successfully completed
    Completed,
    /// Failed execution
    Failed,
    /// Cancelled before completion
    Cancelled,
    /// Skipped (dependency failed)
    Skipped,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl TaskStatus {
    /// Valid target states from this state.
    pub fn allowed_transitions(&self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            Pending => &[Ready, Assigned, Cancelled],
            Ready => &[Assigned, Cancelled],
            Assigned => &[InProgress, Cancelled],
            InProgress => &[Completed, Failed, Blocked, Paused],
            Blocked => &[InProgress, Cancelled],
            Paused => &[InProgress, Cancelled],
            Completed | Failed | Cancelled | Skipped => &[],
        }
    }

    /// Check whether a transition to `target` is permitted.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Check if status is terminal.
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl_db_string_enum!(TaskStatus, TaskStatusParseError, {
    Pending => "pending",
    Ready => "ready",
    Assigned => "assigned",
    InProgress => "in_progress",
    Blocked => "blocked",
    Paused => "paused",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
    Skipped => "skipped",
});

/// Task execution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Blocks all other work
    Blocker,
    /// Must be completed soon
    Critical,
    /// Important, but not blocking
    High,
    /// Standard priority
    Normal,
    /// Can be deferred
    Low,
    /// Non-urgent background work
    Background,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

impl_db_string_enum!(TaskPriority, TaskPriorityParseError, {
    Blocker => "blocker",
    Critical => "critical",
    High => "high",
    Normal => "normal",
    Low => "low",
    Background => "background",
});

/// Task complexity classification derived from expected hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    /// < 15 minutes
    Trivial,
    /// 15-60 minutes
    Simple,
    /// 1-4 hours
    Moderate,
    /// 4-8 hours
    Complex,
    /// 8+ hours
    Expert,
}

impl TaskComplexity {
    /// Classify expected hours into a complexity bucket.
    pub fn from_expected_hours(hours: f64) -> Self {
        if hours < 0.25 {
            TaskComplexity::Trivial
        } else if hours < 1.0 {
            TaskComplexity::Simple
        } else if hours < 4.0 {
            TaskComplexity::Moderate
        } else if hours < 8.0 {
            TaskComplexity::Complex
        } else {
            TaskComplexity::Expert
        }
    }

    /// Numeric rank used when computing decomposition fan-out.
    pub fn rank(&self) -> u8 {
        match self {
            TaskComplexity::Trivial => 1,
            TaskComplexity::Simple => 2,
            TaskComplexity::Moderate => 3,
            TaskComplexity::Complex => 4,
            TaskComplexity::Expert => 5,
        }
    }
}

impl_db_string_enum!(TaskComplexity, TaskComplexityParseError, {
    Trivial => "trivial",
    Simple => "simple",
    Moderate => "moderate",
    Complex => "complex",
    Expert => "expert",
});

/// Dependency semantics between two tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDependencyKind {
    /// B can't start until A finishes
    FinishToStart,
    /// B can't start until A starts
    StartToStart,
    /// B can't finish until A finishes
    FinishToFinish,
    /// B can't finish until A starts
    StartToFinish,
}

impl Default for TaskDependencyKind {
    fn default() -> Self {
        TaskDependencyKind::FinishToStart
    }
}

impl_db_string_enum!(TaskDependencyKind, TaskDependencyKindParseError, {
    FinishToStart => "finish_to_start",
    StartToStart => "start_to_start",
    FinishToFinish => "finish_to_finish",
    StartToFinish => "start_to_finish",
});

/// Where an estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationSource {
    Manual,
    AiAnalysis,
    Historical,
    Decomposition,
    Default,
}

impl Default for EstimationSource {
    fn default() -> Self {
        EstimationSource::Manual
    }
}

impl_db_string_enum!(EstimationSource, EstimationSourceParseError, {
    Manual => "manual",
    AiAnalysis => "ai_analysis",
    Historical => "historical",
    Decomposition => "decomposition",
    Default => "default",
});

// ============================================================================
// AGENT CLASSIFICATION
// ============================================================================

/// Performance classification based on historical success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    /// > 95% success rate, exceptional quality
    Elite,
    /// 85-95% success rate, high quality
    Advanced,
    /// 70-85% success rate, reliable
    Competent,
    /// 50-70% success rate, learning
    Trainee,
    /// Performance issues detected; removed from routing
    Degraded,
}

impl PerformanceTier {
    /// Ordering rank, best first. Used for sorting and min-tier filtering.
    pub fn rank(&self) -> u8 {
        match self {
            PerformanceTier::Elite => 0,
            PerformanceTier::Advanced => 1,
            PerformanceTier::Competent => 2,
            PerformanceTier::Trainee => 3,
            PerformanceTier::Degraded => 4,
        }
    }

    /// Routing score contribution in [0, 1].
    pub fn score(&self) -> f64 {
        match self {
            PerformanceTier::Elite => 1.0,
            PerformanceTier::Advanced => 0.8,
            PerformanceTier::Competent => 0.6,
            PerformanceTier::Trainee => 0.4,
            PerformanceTier::Degraded => 0.0,
        }
    }
}

impl Default for PerformanceTier {
    fn default() -> Self {
        PerformanceTier::Competent
    }
}

impl_db_string_enum!(PerformanceTier, PerformanceTierParseError, {
    Elite => "elite",
    Advanced => "advanced",
    Competent => "competent",
    Trainee => "trainee",
    Degraded => "degraded",
});

/// Current workload classification for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    Idle,
    Optimal,
    High,
    Critical,
    Overloaded,
}

impl LoadLevel {
    /// Derive the load level from task-count utilization (current / max).
    ///
    /// This is the registry-side classifier; utilization 0 is idle and 1.0
    /// is critical, anything above capacity is overloaded.
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization <= 0.0 {
            LoadLevel::Idle
        } else if utilization < 0.5 {
            LoadLevel::Optimal
        } else if utilization < 0.8 {
            LoadLevel::High
        } else if utilization <= 1.0 {
            LoadLevel::Critical
        } else {
            LoadLevel::Overloaded
        }
    }

    /// Routing score contribution in [0, 1]; lower load scores higher.
    pub fn score(&self) -> f64 {
        match self {
            LoadLevel::Idle => 1.0,
            LoadLevel::Optimal => 0.8,
            LoadLevel::High => 0.5,
            LoadLevel::Critical => 0.2,
            LoadLevel::Overloaded => 0.0,
        }
    }
}

impl Default for LoadLevel {
    fn default() -> Self {
        LoadLevel::Idle
    }
}

impl_db_string_enum!(LoadLevel, LoadLevelParseError, {
    Idle => "idle",
    Optimal => "optimal",
    High => "high",
    Critical => "critical",
    Overloaded => "overloaded",
});

// ============================================================================
// CONTEXT CLASSIFICATION
// ============================================================================

/// Scope levels for context visibility and lifecycle.
///
/// Ordered from least to most permissive; merges promote to the wider of
/// the two scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextScope {
    Temporary,
    Session,
    Agent,
    Global,
}

impl Default for ContextScope {
    fn default() -> Self {
        ContextScope::Session
    }
}

impl_db_string_enum!(ContextScope, ContextScopeParseError, {
    Temporary => "temporary",
    Session => "session",
    Agent => "agent",
    Global => "global",
});

/// Strategy for merging contexts with conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    LastWriteWins,
    DeepMerge,
    PreferSource,
    PreferTarget,
    /// Records conflicting keys but still produces a merged value
    Manual,
}

impl_db_string_enum!(MergeStrategy, MergeStrategyParseError, {
    LastWriteWins => "last_write_wins",
    DeepMerge => "deep_merge",
    PreferSource => "prefer_source",
    PreferTarget => "prefer_target",
    Manual => "manual",
});

// ============================================================================
// FINE-TUNING LIFECYCLE
// ============================================================================

/// Lifecycle status for a fine-tuning job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FineTuningStatus {
    /// Job created but not started
    Pending,
    /// Job submitted to compute provider
    Queued,
    /// Training in progress
    Running,
    /// Running evaluation benchmarks
    Evaluating,
    /// Training finished successfully
    Completed,
    /// Training failed
    Failed,
    /// Job manually stopped
    Cancelled,
}

impl Default for FineTuningStatus {
    fn default() -> Self {
        FineTuningStatus::Pending
    }
}

impl FineTuningStatus {
    /// Check whether a transition to `target` is permitted.
    ///
    /// `Failed` and `Cancelled` may transition back to `Pending` (retry);
    /// `Completed` is strictly terminal.
    pub fn can_transition_to(&self, target: FineTuningStatus) -> bool {
        use FineTuningStatus::*;
        match self {
            Completed => false,
            Failed | Cancelled => target == Pending,
            Pending => matches!(target, Queued | Cancelled),
            Queued => matches!(target, Running | Cancelled | Failed),
            Running => matches!(target, Evaluating | Completed | Failed | Cancelled),
            Evaluating => matches!(target, Completed | Failed),
        }
    }
}

impl_db_string_enum!(FineTuningStatus, FineTuningStatusParseError, {
    Pending => "pending",
    Queued => "queued",
    Running => "running",
    Evaluating => "evaluating",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});
