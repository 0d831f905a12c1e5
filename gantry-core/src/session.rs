//! Session entity, execution metrics, and checkpoints.
//!
//! A session is the top-level unit of orchestrated work. Status changes go
//! through [`Session::transition_to`], which validates against the state
//! machine and returns the emitted domain events for the caller to publish.

use crate::error::{StateError, ValidationError};
use crate::event::SessionEvent;
use crate::identity::{EntityIdType, SessionId, TenantId, Timestamp};
use crate::status::SessionStatus;
use crate::{SessionPriority, SessionType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Checkpoints kept in memory per session; storage keeps all of them.
pub const CHECKPOINT_MEMORY_LIMIT: usize = 100;

/// Retries permitted before a session stops being recoverable.
pub const MAX_SESSION_RETRIES: i32 = 3;

/// Session titles rejected as too generic, compared case-insensitively.
const GENERIC_TITLES: [&str; 5] = [
    "test session",
    "new session",
    "untitled",
    "coding task",
    "development session",
];

// ============================================================================
// EXECUTION METRICS
// ============================================================================

/// A single warning recorded against a session run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWarning {
    pub warning_type: String,
    pub message: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

/// Structured error blob recorded on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionErrorRecord {
    /// Error type tag, e.g. "RuntimeError" or a `GantryError` kind
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

/// Execution telemetry, 1:1 with a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    // Timestamps
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,

    // Duration metrics
    pub queue_duration_seconds: Option<f64>,
    pub execution_duration_seconds: Option<f64>,
    pub total_duration_seconds: Option<f64>,

    // Resource utilization
    pub cpu_usage_percent: Option<f64>,
    pub memory_usage_mb: Option<f64>,
    pub disk_usage_mb: Option<f64>,
    pub network_bytes_sent: Option<u64>,
    pub network_bytes_received: Option<u64>,

    // Performance counters
    pub total_tokens_used: Option<u64>,
    pub api_calls_count: u32,
    pub api_errors_count: u32,
    pub retry_count: i32,

    // Quality metrics, all in [0, 1]
    pub success_rate: Option<f64>,
    pub confidence_score: Option<f64>,
    pub code_quality_score: Option<f64>,

    // Results
    pub result: Option<Value>,
    pub error: Option<SessionErrorRecord>,
    #[serde(default)]
    pub warnings: Vec<SessionWarning>,

    // Checkpointing
    pub checkpoint_count: u32,
    pub last_checkpoint_at: Option<Timestamp>,

    // Cost tracking
    pub estimated_cost_usd: Option<f64>,
}

impl SessionMetrics {
    pub fn new(now: Timestamp) -> Self {
        Self {
            created_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            queue_duration_seconds: None,
            execution_duration_seconds: None,
            total_duration_seconds: None,
            cpu_usage_percent: None,
            memory_usage_mb: None,
            disk_usage_mb: None,
            network_bytes_sent: None,
            network_bytes_received: None,
            total_tokens_used: None,
            api_calls_count: 0,
            api_errors_count: 0,
            retry_count: 0,
            success_rate: None,
            confidence_score: None,
            code_quality_score: None,
            result: None,
            error: None,
            warnings: Vec::new(),
            checkpoint_count: 0,
            last_checkpoint_at: None,
            estimated_cost_usd: None,
        }
    }

    /// Record execution start and the time spent queued.
    pub fn start_timing(&mut self, now: Timestamp) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
            self.queue_duration_seconds =
                Some((now - self.created_at).num_milliseconds() as f64 / 1000.0);
        }
    }

    /// Record completion time and derived durations.
    pub fn complete_timing(&mut self, now: Timestamp) {
        if let Some(started) = self.started_at {
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
                self.execution_duration_seconds =
                    Some((now - started).num_milliseconds() as f64 / 1000.0);
                self.total_duration_seconds =
                    Some((now - self.created_at).num_milliseconds() as f64 / 1000.0);
            }
        }
    }

    /// Record failure time.
    pub fn fail_timing(&mut self, now: Timestamp) {
        if let Some(started) = self.started_at {
            if self.failed_at.is_none() {
                self.failed_at = Some(now);
                self.execution_duration_seconds =
                    Some((now - started).num_milliseconds() as f64 / 1000.0);
            }
        }
    }

    pub fn increment_api_calls(&mut self, count: u32) {
        self.api_calls_count += count;
    }

    pub fn increment_api_errors(&mut self, count: u32) {
        self.api_errors_count += count;
    }

    pub fn increment_retry_count(&mut self) {
        self.retry_count += 1;
    }

    pub fn record_checkpoint(&mut self, now: Timestamp) {
        self.checkpoint_count += 1;
        self.last_checkpoint_at = Some(now);
    }

    pub fn add_warning(
        &mut self,
        warning_type: &str,
        message: &str,
        context: BTreeMap<String, Value>,
    ) {
        self.warnings.push(SessionWarning {
            warning_type: warning_type.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            context,
        });
    }

    /// API error rate over the recorded calls; 0.0 when no calls were made.
    pub fn api_error_rate(&self) -> f64 {
        if self.api_calls_count == 0 {
            return 0.0;
        }
        self.api_errors_count as f64 / self.api_calls_count as f64
    }

    /// Unhealthy when the error rate exceeds 10%, retries exceed 5, or more
    /// than 10 warnings have accumulated.
    pub fn is_healthy(&self) -> bool {
        if self.api_errors_count > 0 && self.api_error_rate() > 0.1 {
            return false;
        }
        if self.retry_count > 5 {
            return false;
        }
        if self.warnings.len() > 10 {
            return false;
        }
        true
    }

    /// Nested summary map for telemetry pipelines.
    pub fn to_telemetry(&self) -> Value {
        serde_json::json!({
            "durations": {
                "queue_seconds": self.queue_duration_seconds,
                "execution_seconds": self.execution_duration_seconds,
                "total_seconds": self.total_duration_seconds,
            },
            "resources": {
                "cpu_percent": self.cpu_usage_percent,
                "memory_mb": self.memory_usage_mb,
                "disk_mb": self.disk_usage_mb,
                "network_sent_bytes": self.network_bytes_sent,
                "network_received_bytes": self.network_bytes_received,
            },
            "performance": {
                "api_calls": self.api_calls_count,
                "api_errors": self.api_errors_count,
                "error_rate": self.api_error_rate(),
                "retries": self.retry_count,
                "tokens_used": self.total_tokens_used,
            },
            "quality": {
                "success_rate": self.success_rate,
                "confidence": self.confidence_score,
                "code_quality": self.code_quality_score,
            },
            "cost": {
                "estimated_usd": self.estimated_cost_usd,
            },
        })
    }
}

// ============================================================================
// CHECKPOINT
// ============================================================================

/// Append-only progress snapshot. Unique on `(session_id, sequence)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: SessionId,
    /// Monotone sequence starting at 1
    pub sequence: u32,
    pub data: Value,
    pub created_at: Timestamp,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

// ============================================================================
// RESOURCE LIMITS
// ============================================================================

/// Bounded resource limits for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall-clock budget, 60..=86400 seconds
    pub max_duration_seconds: u32,
    /// Optional CPU cap, 0.1..=8.0 cores
    pub cpu_limit: Option<f64>,
    /// Optional memory cap, 100..=8192 MB
    pub memory_limit_mb: Option<u32>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_duration_seconds: 3600,
            cpu_limit: None,
            memory_limit_mb: None,
        }
    }
}

impl ResourceLimits {
    /// Validate the bounds documented in the storage schema.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(60..=86_400).contains(&self.max_duration_seconds) {
            return Err(ValidationError::OutOfRange {
                field: "max_duration_seconds".into(),
                value: self.max_duration_seconds as f64,
                min: 60.0,
                max: 86_400.0,
            });
        }
        if let Some(cpu) = self.cpu_limit {
            if !(0.1..=8.0).contains(&cpu) {
                return Err(ValidationError::OutOfRange {
                    field: "cpu_limit".into(),
                    value: cpu,
                    min: 0.1,
                    max: 8.0,
                });
            }
        }
        if let Some(mem) = self.memory_limit_mb {
            if !(100..=8192).contains(&mem) {
                return Err(ValidationError::OutOfRange {
                    field: "memory_limit_mb".into(),
                    value: mem as f64,
                    min: 100.0,
                    max: 8192.0,
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// SESSION ENTITY
// ============================================================================

/// A unit of orchestrated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub tenant_id: TenantId,

    // Business identity
    pub title: String,
    pub description: Option<String>,
    pub session_type: SessionType,
    pub priority: SessionPriority,

    // State management
    pub status: SessionStatus,
    pub status_updated_at: Timestamp,

    // Relationships
    pub parent_id: Option<SessionId>,
    /// Denormalized; maintained at the storage write boundary
    #[serde(default)]
    pub child_ids: Vec<SessionId>,

    // Execution context
    #[serde(default)]
    pub agent_config: BTreeMap<String, Value>,
    pub model_identifier: Option<String>,
    pub initial_prompt: String,

    // Resource allocation
    pub limits: ResourceLimits,

    // Telemetry
    pub metrics: SessionMetrics,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,

    // System metadata
    pub created_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    /// Optimistic-locking version, strictly +1 per update
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Session {
    /// Create a new pending session after validating title and prompt.
    pub fn new(
        tenant_id: TenantId,
        title: &str,
        initial_prompt: &str,
    ) -> Result<Self, ValidationError> {
        let title = validate_title(title)?;
        let prompt = validate_prompt(initial_prompt)?;
        let now = Utc::now();

        Ok(Self {
            id: SessionId::now_v7(),
            tenant_id,
            title,
            description: None,
            session_type: SessionType::default(),
            priority: SessionPriority::default(),
            status: SessionStatus::Pending,
            status_updated_at: now,
            parent_id: None,
            child_ids: Vec::new(),
            agent_config: BTreeMap::new(),
            model_identifier: None,
            initial_prompt: prompt,
            limits: ResourceLimits::default(),
            metrics: SessionMetrics::new(now),
            checkpoints: Vec::new(),
            created_by: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn with_type(mut self, session_type: SessionType) -> Self {
        self.session_type = session_type;
        self
    }

    pub fn with_priority(mut self, priority: SessionPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_agent_config(mut self, agent_config: BTreeMap<String, Value>) -> Self {
        self.agent_config = agent_config;
        self
    }

    pub fn with_parent(mut self, parent_id: SessionId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Validated state transition. Records `status_updated_at` and returns
    /// the `SessionStatusChanged` event for the caller to publish.
    pub fn transition_to(
        &mut self,
        target: SessionStatus,
    ) -> Result<SessionEvent, StateError> {
        if !self.status.can_transition_to(target) {
            return Err(StateError::InvalidSessionTransition {
                session_id: self.id,
                current: self.status,
                target,
                reason: None,
            });
        }

        let old_status = self.status;
        let now = Utc::now();
        self.status = target;
        self.status_updated_at = now;
        self.updated_at = now;

        Ok(SessionEvent::StatusChanged {
            session_id: self.id,
            old_status,
            new_status: target,
            timestamp: now,
        })
    }

    /// Begin execution. Strict `pending -> running`; stamps `started_at`.
    pub fn start_execution(&mut self) -> Result<SessionEvent, StateError> {
        if self.status != SessionStatus::Pending {
            return Err(StateError::InvalidSessionTransition {
                session_id: self.id,
                current: self.status,
                target: SessionStatus::Running,
                reason: Some("can only start from pending state".into()),
            });
        }

        let event = self.transition_to(SessionStatus::Running)?;
        self.metrics.start_timing(Utc::now());
        Ok(event)
    }

    /// Mark completed with execution results; stamps durations.
    pub fn complete_with_result(
        &mut self,
        result: Value,
    ) -> Result<Vec<SessionEvent>, StateError> {
        let status_event = self.transition_to(SessionStatus::Completed)?;
        let now = Utc::now();
        self.metrics.complete_timing(now);
        self.metrics.result = Some(result.clone());

        Ok(vec![
            status_event,
            SessionEvent::Completed {
                session_id: self.id,
                result,
                success_rate: self.metrics.success_rate.unwrap_or(1.0),
                execution_duration_seconds: self.metrics.execution_duration_seconds,
                timestamp: now,
            },
        ])
    }

    /// Mark failed with a structured error record.
    pub fn fail_with_error(
        &mut self,
        error_type: &str,
        message: &str,
        context: BTreeMap<String, Value>,
        retryable: bool,
    ) -> Result<Vec<SessionEvent>, StateError> {
        let status_event = self.transition_to(SessionStatus::Failed)?;
        let now = Utc::now();
        self.metrics.fail_timing(now);
        self.metrics.error = Some(SessionErrorRecord {
            error_type: error_type.to_string(),
            message: message.to_string(),
            context: context.clone(),
        });

        if retryable {
            self.metadata
                .insert("retryable".into(), Value::Bool(true));
            let count = self
                .metadata
                .get("retry_count")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            self.metadata
                .insert("retry_count".into(), Value::from(count + 1));
        }

        Ok(vec![
            status_event,
            SessionEvent::Failed {
                session_id: self.id,
                error_type: error_type.to_string(),
                error_message: message.to_string(),
                error_context: context,
                retryable,
                timestamp: now,
            },
        ])
    }

    /// Append a checkpoint with the next in-memory sequence. The in-memory
    /// ring keeps the 100 most recent; storage keeps all.
    pub fn add_checkpoint(&mut self, data: Value) -> &Checkpoint {
        let now = Utc::now();
        let sequence = self
            .checkpoints
            .last()
            .map(|c| c.sequence + 1)
            .unwrap_or(1);

        self.checkpoints.push(Checkpoint {
            session_id: self.id,
            sequence,
            data,
            created_at: now,
            metadata: BTreeMap::new(),
        });
        self.metrics.record_checkpoint(now);

        if self.checkpoints.len() > CHECKPOINT_MEMORY_LIMIT {
            let excess = self.checkpoints.len() - CHECKPOINT_MEMORY_LIMIT;
            self.checkpoints.drain(..excess);
        }

        self.checkpoints.last().unwrap_or_else(|| unreachable!())
    }

    /// Most recent checkpoint, for recovery.
    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Health score in [0, 1].
    ///
    /// 1.0 completed, 0.0 failed; running sessions degrade by elapsed
    /// fraction of the duration budget; 0.8 for any other state.
    pub fn health_score(&self, now: Timestamp) -> f64 {
        match self.status {
            SessionStatus::Completed => 1.0,
            SessionStatus::Failed => 0.0,
            SessionStatus::Running => {
                let Some(started) = self.metrics.started_at else {
                    return 0.8;
                };
                let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
                let ratio =
                    (elapsed / self.limits.max_duration_seconds as f64).min(1.0);
                if ratio > 0.9 {
                    0.3
                } else if ratio > 0.7 {
                    0.7
                } else {
                    0.9
                }
            }
            _ => 0.8,
        }
    }

    /// A failed session is recoverable iff it is in failed/timeout/stopped,
    /// has at least one checkpoint, and has been retried fewer than 3 times.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Failed | SessionStatus::Timeout | SessionStatus::Stopped
        ) && !self.checkpoints.is_empty()
            && self.metrics.retry_count < MAX_SESSION_RETRIES
    }

    /// Reset a recoverable session back to `pending` for retry.
    ///
    /// This is the one deliberate bypass of the transition map: checkpoints
    /// and metrics are preserved and `retry_count` is incremented. Fails
    /// unless [`Session::is_recoverable`] holds.
    pub fn reset_for_retry(&mut self) -> Result<SessionEvent, StateError> {
        if !self.is_recoverable() {
            return Err(StateError::SessionNotRecoverable {
                session_id: self.id,
            });
        }

        let old_status = self.status;
        let now = Utc::now();
        self.status = SessionStatus::Pending;
        self.status_updated_at = now;
        self.updated_at = now;
        self.metrics.increment_retry_count();

        Ok(SessionEvent::StatusChanged {
            session_id: self.id,
            old_status,
            new_status: SessionStatus::Pending,
            timestamp: now,
        })
    }

    /// Seconds remaining before the duration budget is exhausted, if running.
    pub fn time_remaining_seconds(&self, now: Timestamp) -> Option<f64> {
        let started = self.metrics.started_at?;
        let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
        Some(self.limits.max_duration_seconds as f64 - elapsed)
    }
}

/// Enforce title bounds and the non-generic naming convention.
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "title".into(),
        });
    }
    if trimmed.len() > 200 {
        return Err(ValidationError::InvalidValue {
            field: "title".into(),
            reason: format!("length {} exceeds 200", trimmed.len()),
        });
    }
    let lower = trimmed.to_lowercase();
    if GENERIC_TITLES.contains(&lower.as_str()) {
        return Err(ValidationError::GenericTitle {
            title: trimmed.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Enforce prompt bounds (1..=10000 chars).
pub fn validate_prompt(prompt: &str) -> Result<String, ValidationError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "initial_prompt".into(),
        });
    }
    if trimmed.chars().count() > 10_000 {
        return Err(ValidationError::InvalidValue {
            field: "initial_prompt".into(),
            reason: "exceeds 10000 characters".into(),
        });
    }
    Ok(trimmed.to_string())
}
