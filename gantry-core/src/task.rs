//! Task entity, PERT estimates, and dependency records.
//!
//! Graph algorithms (cycle detection, topological order, critical path) live
//! in `gantry-tasks`; this module holds the data and the per-entity
//! invariants: no self-dependencies, no duplicate dependencies, validated
//! status transitions.

use crate::capability::AgentCapability;
use crate::error::{StateError, TaskGraphError, ValidationError};
use crate::identity::{AgentId, EntityIdType, SessionId, TaskId, TenantId, Timestamp};
use crate::{EstimationSource, TaskComplexity, TaskDependencyKind, TaskPriority, TaskStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Action verbs a task title must start with.
pub const ACTION_VERBS: [&str; 12] = [
    "implement",
    "create",
    "add",
    "update",
    "fix",
    "refactor",
    "optimize",
    "test",
    "review",
    "deploy",
    "configure",
    "document",
];

// ============================================================================
// PERT ESTIMATE
// ============================================================================

/// Three-point time and resource estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEstimate {
    // Time estimates (hours)
    pub optimistic_hours: f64,
    pub likely_hours: f64,
    pub pessimistic_hours: f64,

    // Resource estimates
    pub estimated_tokens: Option<u64>,
    pub estimated_cost_usd: Option<f64>,
    #[serde(default)]
    pub required_capabilities: Vec<AgentCapability>,

    // Confidence metrics
    pub confidence: f64,
    pub last_estimated_at: Option<Timestamp>,
    pub source: EstimationSource,
}

impl Default for TaskEstimate {
    fn default() -> Self {
        Self {
            optimistic_hours: 0.0,
            likely_hours: 0.0,
            pessimistic_hours: 0.0,
            estimated_tokens: None,
            estimated_cost_usd: None,
            required_capabilities: Vec::new(),
            confidence: 0.5,
            last_estimated_at: None,
            source: EstimationSource::Manual,
        }
    }
}

impl TaskEstimate {
    /// Convenience constructor for a likely-hours-only estimate.
    pub fn likely(hours: f64) -> Self {
        Self {
            likely_hours: hours,
            ..Default::default()
        }
    }

    /// Expected hours via the PERT formula `(O + 4M + P) / 6`.
    pub fn expected_hours(&self) -> f64 {
        if self.optimistic_hours == 0.0
            && self.likely_hours == 0.0
            && self.pessimistic_hours == 0.0
        {
            return 0.0;
        }
        (self.optimistic_hours + 4.0 * self.likely_hours + self.pessimistic_hours) / 6.0
    }

    /// Standard deviation `(P - O) / 6`; 0 when the spread is degenerate.
    pub fn standard_deviation_hours(&self) -> f64 {
        if self.pessimistic_hours <= self.optimistic_hours {
            return 0.0;
        }
        (self.pessimistic_hours - self.optimistic_hours) / 6.0
    }

    /// Complexity bucket for the expected hours.
    pub fn complexity(&self) -> TaskComplexity {
        TaskComplexity::from_expected_hours(self.expected_hours())
    }

    /// Fold actual execution data back into the estimate: average the likely
    /// hours with the actual, widen O/P to cover the observation, bump
    /// confidence by 0.05 (capped at 0.95), and switch the source to
    /// `historical`.
    pub fn update_from_execution(
        &mut self,
        actual_hours: f64,
        actual_tokens: Option<u64>,
        actual_cost_usd: Option<f64>,
    ) {
        self.likely_hours = (self.likely_hours + actual_hours) / 2.0;

        if actual_hours < self.optimistic_hours {
            self.optimistic_hours = actual_hours;
        } else if actual_hours > self.pessimistic_hours {
            self.pessimistic_hours = actual_hours;
        }

        self.confidence = (self.confidence + 0.05).min(0.95);

        if let Some(tokens) = actual_tokens {
            self.estimated_tokens = Some(tokens);
        }
        if let Some(cost) = actual_cost_usd {
            self.estimated_cost_usd = Some(cost);
        }

        self.last_estimated_at = Some(Utc::now());
        self.source = EstimationSource::Historical;
    }
}

// ============================================================================
// DEPENDENCY
// ============================================================================

/// A dependency of `source_task_id` on `target_task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub source_task_id: TaskId,
    pub target_task_id: TaskId,
    pub kind: TaskDependencyKind,
    pub is_required: bool,
    pub description: Option<String>,
}

// ============================================================================
// TASK ENTITY
// ============================================================================

/// A unit of work within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub parent_task_id: Option<TaskId>,

    // Identity
    pub title: String,
    pub description: Option<String>,
    pub task_type: String,

    // Execution state
    pub status: TaskStatus,
    pub status_updated_at: Timestamp,
    pub assigned_agent_id: Option<AgentId>,
    pub assigned_at: Option<Timestamp>,

    // Planning
    pub priority: TaskPriority,
    pub estimate: TaskEstimate,

    // Dependencies
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
    /// Reverse references, maintained by the graph layer
    #[serde(default)]
    pub dependents: Vec<TaskId>,

    // Execution tracking
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,

    // Results
    pub result: Option<Value>,
    pub error: Option<Value>,
    #[serde(default)]
    pub artifacts: Vec<Value>,

    // Metadata
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    /// Child tasks, for decomposition hierarchies
    #[serde(default)]
    pub children: Vec<Task>,
}

impl Task {
    /// Create a new pending task after validating the actionable title.
    pub fn new(
        tenant_id: TenantId,
        session_id: SessionId,
        title: &str,
    ) -> Result<Self, ValidationError> {
        let title = validate_task_title(title)?;
        let now = Utc::now();

        Ok(Self {
            id: TaskId::now_v7(),
            tenant_id,
            session_id,
            parent_task_id: None,
            title,
            description: None,
            task_type: "implementation".to_string(),
            status: TaskStatus::Pending,
            status_updated_at: now,
            assigned_agent_id: None,
            assigned_at: None,
            priority: TaskPriority::Normal,
            estimate: TaskEstimate::default(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            started_at: None,
            completed_at: None,
            failed_at: None,
            result: None,
            error: None,
            artifacts: Vec::new(),
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            children: Vec::new(),
        })
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task_type = task_type.to_string();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimate(mut self, estimate: TaskEstimate) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent_task_id.is_none()
    }

    /// Elapsed hours if in progress.
    pub fn elapsed_hours(&self, now: Timestamp) -> Option<f64> {
        match (self.started_at, self.completed_at, self.failed_at) {
            (Some(started), None, None) => {
                Some((now - started).num_milliseconds() as f64 / 3_600_000.0)
            }
            _ => None,
        }
    }

    /// Total duration if finished (completed or failed).
    pub fn duration_hours(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.completed_at.or(self.failed_at)?;
        Some((finished - started).num_milliseconds() as f64 / 3_600_000.0)
    }

    /// Add a dependency on another task. Rejects self-dependencies and
    /// duplicates; cycle detection over the full graph is the graph layer's
    /// job.
    pub fn add_dependency(
        &mut self,
        target: TaskId,
        kind: TaskDependencyKind,
        description: Option<String>,
    ) -> Result<(), TaskGraphError> {
        if target == self.id {
            return Err(TaskGraphError::SelfDependency { task_id: self.id });
        }
        if self.dependencies.iter().any(|d| d.target_task_id == target) {
            return Err(TaskGraphError::DuplicateDependency {
                task_id: self.id,
                target_id: target,
            });
        }

        self.dependencies.push(TaskDependency {
            source_task_id: self.id,
            target_task_id: target,
            kind,
            is_required: true,
            description,
        });
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach a child task, wiring its parent pointer.
    pub fn add_child(&mut self, mut child: Task) {
        child.parent_task_id = Some(self.id);
        self.children.push(child);
        self.updated_at = Utc::now();
    }

    /// Validated status transition with timestamp stamping.
    pub fn update_status(&mut self, target: TaskStatus) -> Result<TaskStatus, StateError> {
        if !self.status.can_transition_to(target) {
            return Err(StateError::InvalidTaskTransition {
                task_id: self.id,
                current: self.status,
                target,
            });
        }

        let old = self.status;
        let now = Utc::now();
        self.status = target;
        self.status_updated_at = now;
        self.updated_at = now;

        match target {
            TaskStatus::InProgress if self.started_at.is_none() => {
                self.started_at = Some(now);
            }
            TaskStatus::Completed if self.completed_at.is_none() => {
                self.completed_at = Some(now);
            }
            TaskStatus::Failed if self.failed_at.is_none() => {
                self.failed_at = Some(now);
            }
            _ => {}
        }

        Ok(old)
    }

    /// Assign to an agent; only valid from pending/ready.
    pub fn assign_to_agent(&mut self, agent_id: AgentId) -> Result<(), StateError> {
        if !matches!(self.status, TaskStatus::Pending | TaskStatus::Ready) {
            return Err(StateError::InvalidTaskTransition {
                task_id: self.id,
                current: self.status,
                target: TaskStatus::Assigned,
            });
        }
        self.assigned_agent_id = Some(agent_id);
        self.assigned_at = Some(Utc::now());
        self.update_status(TaskStatus::Assigned)?;
        Ok(())
    }

    /// Complete with results, folding actuals back into the estimate.
    pub fn complete_with_result(
        &mut self,
        result: Value,
        actual_hours: Option<f64>,
        actual_tokens: Option<u64>,
        actual_cost_usd: Option<f64>,
    ) -> Result<(), StateError> {
        self.result = Some(result);
        if let Some(hours) = actual_hours {
            self.estimate
                .update_from_execution(hours, actual_tokens, actual_cost_usd);
        }
        self.update_status(TaskStatus::Completed)?;
        Ok(())
    }

    /// Fail with a structured error value.
    pub fn fail_with_error(&mut self, error_type: &str, message: &str) -> Result<(), StateError> {
        self.error = Some(serde_json::json!({
            "type": error_type,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        }));
        self.update_status(TaskStatus::Failed)?;
        Ok(())
    }

    /// Count subtasks recursively, optionally filtered by status.
    pub fn count_subtasks(&self, status_filter: Option<TaskStatus>) -> usize {
        let mut count = 0;
        for child in &self.children {
            if status_filter.is_none_or(|s| child.status == s) {
                count += 1;
            }
            count += child.count_subtasks(status_filter);
        }
        count
    }

    /// Find a task in this subtree by id.
    pub fn find_subtask(&self, task_id: TaskId) -> Option<&Task> {
        if self.id == task_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_subtask(task_id))
    }

    /// Flatten this task and all descendants into a list.
    pub fn flatten(&self) -> Vec<&Task> {
        let mut tasks = vec![self];
        for child in &self.children {
            tasks.extend(child.flatten());
        }
        tasks
    }

    /// Depth of this task tree (a leaf counts as 1).
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(Task::depth)
            .max()
            .unwrap_or(0)
    }
}

/// Enforce that a task title starts with an action verb.
pub fn validate_task_title(title: &str) -> Result<String, ValidationError> {
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

    let first_word = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();
    if !ACTION_VERBS.contains(&first_word.as_str()) {
        return Err(ValidationError::NonActionableTitle {
            title: trimmed.to_string(),
        });
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityIdType;

    fn make_task(title: &str) -> Task {
        Task::new(TenantId::now_v7(), SessionId::now_v7(), title).expect("valid task")
    }

    #[test]
    fn test_title_must_be_actionable() {
        assert!(Task::new(TenantId::now_v7(), SessionId::now_v7(), "Think about stuff").is_err());
        assert!(Task::new(TenantId::now_v7(), SessionId::now_v7(), "Implement auth").is_ok());
        assert!(Task::new(TenantId::now_v7(), SessionId::now_v7(), "deploy service").is_ok());
    }

    #[test]
    fn test_pert_expected_hours() {
        let estimate = TaskEstimate {
            optimistic_hours: 2.0,
            likely_hours: 4.0,
            pessimistic_hours: 12.0,
            ..Default::default()
        };
        // (2 + 16 + 12) / 6 = 5
        assert!((estimate.expected_hours() - 5.0).abs() < 1e-9);
        assert!((estimate.standard_deviation_hours() - 10.0 / 6.0).abs() < 1e-9);
        assert_eq!(estimate.complexity(), TaskComplexity::Complex);
    }

    #[test]
    fn test_zero_estimate() {
        let estimate = TaskEstimate::default();
        assert_eq!(estimate.expected_hours(), 0.0);
        assert_eq!(estimate.standard_deviation_hours(), 0.0);
    }

    #[test]
    fn test_update_from_execution() {
        let mut estimate = TaskEstimate {
            optimistic_hours: 1.0,
            likely_hours: 2.0,
            pessimistic_hours: 3.0,
            confidence: 0.5,
            ..Default::default()
        };

        estimate.update_from_execution(4.0, Some(5000), Some(0.42));

        assert!((estimate.likely_hours - 3.0).abs() < 1e-9);
        assert!((estimate.pessimistic_hours - 4.0).abs() < 1e-9);
        assert!((estimate.confidence - 0.55).abs() < 1e-9);
        assert_eq!(estimate.source, EstimationSource::Historical);
        assert_eq!(estimate.estimated_tokens, Some(5000));
    }

    #[test]
    fn test_repeated_identical_updates_converge() {
        let mut estimate = TaskEstimate {
            likely_hours: 2.0,
            confidence: 0.5,
            ..Default::default()
        };

        for _ in 0..20 {
            estimate.update_from_execution(2.0, None, None);
        }

        // likely converges to the actual; confidence caps at 0.95
        assert!((estimate.likely_hours - 2.0).abs() < 1e-6);
        assert!((estimate.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut task = make_task("Implement auth");
        let id = task.id;
        let err = task
            .add_dependency(id, TaskDependencyKind::FinishToStart, None)
            .unwrap_err();
        assert!(matches!(err, TaskGraphError::SelfDependency { .. }));
    }

    #[test]
    fn test_duplicate_dependency_rejected() {
        let mut task = make_task("Implement auth");
        let other = TaskId::now_v7();
        task.add_dependency(other, TaskDependencyKind::FinishToStart, None)
            .expect("first edge");
        let err = task
            .add_dependency(other, TaskDependencyKind::StartToStart, None)
            .unwrap_err();
        assert!(matches!(err, TaskGraphError::DuplicateDependency { .. }));
    }

    #[test]
    fn test_status_transitions_stamp_timestamps() {
        let mut task = make_task("Implement auth");
        task.assign_to_agent(AgentId::now_v7()).expect("assign");
        assert_eq!(task.status, TaskStatus::Assigned);
        assert!(task.assigned_at.is_some());

        task.update_status(TaskStatus::InProgress).expect("start");
        assert!(task.started_at.is_some());

        task.update_status(TaskStatus::Completed).expect("complete");
        assert!(task.completed_at.is_some());

        let err = task.update_status(TaskStatus::InProgress).unwrap_err();
        assert!(matches!(err, StateError::InvalidTaskTransition { .. }));
    }

    #[test]
    fn test_child_wiring_and_counting() {
        let mut root = make_task("Implement service");
        let mut child = make_task("Implement handler");
        child.add_child(make_task("Test handler"));
        root.add_child(child);

        assert_eq!(root.count_subtasks(None), 2);
        assert_eq!(root.depth(), 3);
        assert_eq!(root.flatten().len(), 3);
        assert!(root.children[0].parent_task_id == Some(root.id));
    }
}
