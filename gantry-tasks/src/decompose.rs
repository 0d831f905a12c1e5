//! Strategy-driven task decomposition.
//!
//! A task whose complexity exceeds the target is split into child tasks;
//! the fan-out equals the complexity delta plus one. Temporal decomposition
//! chains consecutive phases with finish-to-start dependencies.

use gantry_core::{
    AgentCapability, EstimationSource, Task, TaskComplexity, TaskDependencyKind, TaskEstimate,
    TaskGraphError,
};
use serde::{Deserialize, Serialize};

/// Decomposition strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionStrategy {
    /// Split by functional components
    Functional,
    /// Split by time/phase
    Temporal,
    /// Split by required capability
    Capability,
}

/// Phase names used by temporal decomposition, in order.
const TEMPORAL_PHASES: [&str; 5] = ["Analysis", "Design", "Implementation", "Testing", "Review"];

/// Decompose `task` in place. Children are appended to `task.children`;
/// returns the number of direct children created (0 when the task is
/// already at or below the target complexity).
pub fn decompose_task(
    task: &mut Task,
    strategy: DecompositionStrategy,
    max_depth: usize,
    target: TaskComplexity,
) -> Result<usize, TaskGraphError> {
    if max_depth == 0 {
        return Ok(0);
    }

    let current = task.estimate.complexity();
    if current.rank() <= target.rank() {
        return Ok(0);
    }
    let fan_out = (current.rank() - target.rank() + 1) as usize;

    let children = match strategy {
        DecompositionStrategy::Functional => functional_children(task, fan_out)?,
        DecompositionStrategy::Temporal => temporal_children(task, fan_out)?,
        DecompositionStrategy::Capability => capability_children(task, fan_out)?,
    };

    let created = children.len();
    for mut child in children {
        // Recurse for functional splits that are still too coarse
        if strategy == DecompositionStrategy::Functional && max_depth > 1 {
            decompose_task(&mut child, strategy, max_depth - 1, target)?;
        }
        task.add_child(child);
    }

    tracing::debug!(
        task = task.title.as_str(),
        strategy = ?strategy,
        created,
        "task decomposed"
    );
    Ok(created)
}

fn child_estimate(parent: &Task, share: f64, confidence_factor: f64) -> TaskEstimate {
    TaskEstimate {
        likely_hours: parent.estimate.likely_hours * share,
        required_capabilities: parent.estimate.required_capabilities.clone(),
        confidence: parent.estimate.confidence * confidence_factor,
        source: EstimationSource::Decomposition,
        ..Default::default()
    }
}

fn functional_children(task: &Task, fan_out: usize) -> Result<Vec<Task>, TaskGraphError> {
    let mut children = Vec::with_capacity(fan_out);
    for i in 0..fan_out {
        let child = Task::new(
            task.tenant_id,
            task.session_id,
            &format!("{} - Component {}", task.title, i + 1),
        )
        .map_err(|e| TaskGraphError::DecompositionFailed {
            reason: e.to_string(),
        })?
        .with_description(&format!("Functional component {} of {}", i + 1, task.title))
        .with_task_type(&task.task_type)
        .with_priority(task.priority)
        .with_estimate(child_estimate(task, 1.0 / fan_out as f64, 0.8));
        children.push(child);
    }
    Ok(children)
}

fn temporal_children(task: &Task, fan_out: usize) -> Result<Vec<Task>, TaskGraphError> {
    let phases = &TEMPORAL_PHASES[..fan_out.min(TEMPORAL_PHASES.len())];
    let mut children: Vec<Task> = Vec::with_capacity(phases.len());

    for phase in phases {
        let mut child = Task::new(
            task.tenant_id,
            task.session_id,
            &format!("{} - {}", task.title, phase),
        )
        .map_err(|e| TaskGraphError::DecompositionFailed {
            reason: e.to_string(),
        })?
        .with_description(&format!("{phase} phase of {}", task.title))
        .with_task_type(&format!("{}_{}", task.task_type, phase.to_lowercase()))
        .with_priority(task.priority)
        .with_estimate(child_estimate(task, 1.0 / phases.len() as f64, 0.7));

        // Chain consecutive phases finish-to-start
        if let Some(previous) = children.last() {
            child.add_dependency(
                previous.id,
                TaskDependencyKind::FinishToStart,
                Some(format!("Depends on {} phase", previous.title)),
            )?;
        }
        children.push(child);
    }
    Ok(children)
}

fn capability_children(task: &Task, fan_out: usize) -> Result<Vec<Task>, TaskGraphError> {
    let capabilities: Vec<AgentCapability> = if task.estimate.required_capabilities.is_empty() {
        vec![AgentCapability::CodeGeneration]
    } else {
        task.estimate.required_capabilities.clone()
    };
    let selected = &capabilities[..capabilities.len().min(fan_out)];

    let mut children = Vec::with_capacity(selected.len());
    for capability in selected {
        let label = capability.as_db_str().replace('_', " ");
        let mut child = Task::new(
            task.tenant_id,
            task.session_id,
            &format!("{} - {}", task.title, title_case(&label)),
        )
        .map_err(|e| TaskGraphError::DecompositionFailed {
            reason: e.to_string(),
        })?
        .with_description(&format!("{label} aspect of {}", task.title))
        .with_task_type(&format!("{}_{}", task.task_type, capability.as_db_str()))
        .with_priority(task.priority);

        child.estimate = TaskEstimate {
            likely_hours: task.estimate.likely_hours / capabilities.len() as f64,
            required_capabilities: vec![*capability],
            confidence: task.estimate.confidence * 0.6,
            source: EstimationSource::Decomposition,
            ..Default::default()
        };
        children.push(child);
    }
    Ok(children)
}

/// Capitalize the first letter of each word.
pub(crate) fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{EntityIdType, SessionId, TenantId};

    fn expert_task() -> Task {
        let mut task = Task::new(
            TenantId::now_v7(),
            SessionId::now_v7(),
            "Implement payment platform",
        )
        .expect("task");
        task.estimate = TaskEstimate {
            likely_hours: 12.0,
            required_capabilities: vec![
                AgentCapability::CodeGeneration,
                AgentCapability::TestGeneration,
            ],
            confidence: 0.6,
            ..Default::default()
        };
        task
    }

    #[test]
    fn test_no_decomposition_below_target() {
        let mut task = Task::new(
            TenantId::now_v7(),
            SessionId::now_v7(),
            "Fix typo in readme",
        )
        .expect("task");
        task.estimate = TaskEstimate::likely(0.1);

        let created =
            decompose_task(&mut task, DecompositionStrategy::Functional, 3, TaskComplexity::Moderate)
                .expect("decompose");
        assert_eq!(created, 0);
        assert!(task.children.is_empty());
    }

    #[test]
    fn test_functional_fan_out() {
        let mut task = expert_task();
        // expert (5) -> moderate (3): fan-out 3
        let created =
            decompose_task(&mut task, DecompositionStrategy::Functional, 1, TaskComplexity::Moderate)
                .expect("decompose");
        assert_eq!(created, 3);
        assert!(task.children[0].title.contains("Component 1"));
        assert_eq!(task.children[0].parent_task_id, Some(task.id));
        assert_eq!(
            task.children[0].estimate.source,
            EstimationSource::Decomposition
        );
    }

    #[test]
    fn test_temporal_chains_finish_to_start() {
        let mut task = expert_task();
        let created =
            decompose_task(&mut task, DecompositionStrategy::Temporal, 1, TaskComplexity::Moderate)
                .expect("decompose");
        assert_eq!(created, 3);

        assert!(task.children[0].dependencies.is_empty());
        for window in task.children.windows(2) {
            let dep = &window[1].dependencies[0];
            assert_eq!(dep.target_task_id, window[0].id);
            assert_eq!(dep.kind, TaskDependencyKind::FinishToStart);
        }
        assert!(task.children[0].title.ends_with("Analysis"));
        assert!(task.children[1].title.ends_with("Design"));
    }

    #[test]
    fn test_capability_split() {
        let mut task = expert_task();
        let created =
            decompose_task(&mut task, DecompositionStrategy::Capability, 1, TaskComplexity::Moderate)
                .expect("decompose");
        assert_eq!(created, 2);
        assert_eq!(
            task.children[0].estimate.required_capabilities.len(),
            1
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("code generation"), "Code Generation");
        assert_eq!(title_case("auth"), "Auth");
    }
}
