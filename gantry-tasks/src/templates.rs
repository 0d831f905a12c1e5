//! Named decomposition templates.
//!
//! A template matches tasks by type and complexity threshold and expands
//! them into one child per phase descriptor, titled
//! `"{parent_title} - {phase}"`. Temporal templates chain consecutive
//! phases finish-to-start.

use crate::decompose::DecompositionStrategy;
use gantry_core::{
    AgentCapability, EstimationSource, Task, TaskComplexity, TaskDependencyKind, TaskEstimate,
    TaskGraphError,
};

/// One phase/component descriptor within a template.
#[derive(Debug, Clone)]
pub struct PhaseTemplate {
    /// Short key, e.g. "requirements"
    pub key: &'static str,
    /// Suffix appended to the parent title
    pub title: &'static str,
    pub description: &'static str,
    pub capabilities: &'static [AgentCapability],
    pub estimated_hours: f64,
}

/// A named decomposition pattern.
#[derive(Debug, Clone)]
pub struct DecompositionTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub complexity_threshold: TaskComplexity,
    pub strategy: DecompositionStrategy,
    pub max_depth: usize,
    pub target_leaf_complexity: TaskComplexity,
    pub applicable_task_types: &'static [&'static str],
    pub excluded_task_types: &'static [&'static str],
    pub phases: &'static [PhaseTemplate],
}

impl DecompositionTemplate {
    /// Expand the template against `task` if it applies. Returns the number
    /// of children added; 0 when the task type or complexity do not match.
    pub fn apply_to_task(&self, task: &mut Task) -> Result<usize, TaskGraphError> {
        if self.excluded_task_types.contains(&task.task_type.as_str()) {
            return Ok(0);
        }
        if !self.applicable_task_types.is_empty()
            && !self.applicable_task_types.contains(&task.task_type.as_str())
        {
            return Ok(0);
        }
        if task.estimate.complexity().rank() < self.complexity_threshold.rank() {
            return Ok(0);
        }

        let mut children: Vec<Task> = Vec::with_capacity(self.phases.len());
        for phase in self.phases {
            let mut child = Task::new(
                task.tenant_id,
                task.session_id,
                &format!("{} - {}", task.title, phase.title),
            )
            .map_err(|e| TaskGraphError::DecompositionFailed {
                reason: e.to_string(),
            })?
            .with_description(phase.description)
            .with_task_type(&format!("{}_{}", task.task_type, phase.key))
            .with_priority(task.priority)
            .with_estimate(TaskEstimate {
                likely_hours: phase.estimated_hours,
                required_capabilities: phase.capabilities.to_vec(),
                confidence: 0.7,
                source: EstimationSource::Decomposition,
                ..Default::default()
            });

            if self.strategy == DecompositionStrategy::Temporal {
                if let Some(previous) = children.last() {
                    child.add_dependency(
                        previous.id,
                        TaskDependencyKind::FinishToStart,
                        Some(format!("Depends on {} phase", previous.title)),
                    )?;
                }
            }
            children.push(child);
        }

        let created = children.len();
        for child in children {
            task.add_child(child);
        }
        tracing::debug!(template = self.name, created, "applied decomposition template");
        Ok(created)
    }
}

/// Built-in templates.
pub fn default_templates() -> Vec<DecompositionTemplate> {
    vec![
        DecompositionTemplate {
            name: "web_service_implementation",
            description: "Full-stack expansion for web service work",
            complexity_threshold: TaskComplexity::Complex,
            strategy: DecompositionStrategy::Temporal,
            max_depth: 4,
            target_leaf_complexity: TaskComplexity::Moderate,
            applicable_task_types: &["web_service", "api", "backend"],
            excluded_task_types: &[],
            phases: &[
                PhaseTemplate {
                    key: "requirements",
                    title: "Requirements Analysis",
                    description: "Analyze and document requirements",
                    capabilities: &[AgentCapability::RequirementsAnalysis],
                    estimated_hours: 2.0,
                },
                PhaseTemplate {
                    key: "design",
                    title: "System Design",
                    description: "Design system architecture and API",
                    capabilities: &[AgentCapability::SystemDesign],
                    estimated_hours: 4.0,
                },
                PhaseTemplate {
                    key: "implementation",
                    title: "Implementation",
                    description: "Implement core functionality",
                    capabilities: &[AgentCapability::CodeGeneration],
                    estimated_hours: 8.0,
                },
                PhaseTemplate {
                    key: "testing",
                    title: "Testing",
                    description: "Write and execute tests",
                    capabilities: &[AgentCapability::TestGeneration],
                    estimated_hours: 4.0,
                },
                PhaseTemplate {
                    key: "deployment",
                    title: "Deployment",
                    description: "Deploy and configure service",
                    capabilities: &[AgentCapability::Deployment],
                    estimated_hours: 2.0,
                },
            ],
        },
        DecompositionTemplate {
            name: "refactoring_task",
            description: "Structured expansion for refactoring work",
            complexity_threshold: TaskComplexity::Moderate,
            strategy: DecompositionStrategy::Functional,
            max_depth: 3,
            target_leaf_complexity: TaskComplexity::Simple,
            applicable_task_types: &["refactoring", "optimization"],
            excluded_task_types: &[],
            phases: &[
                PhaseTemplate {
                    key: "analysis",
                    title: "Code Analysis",
                    description: "Analyze current code structure",
                    capabilities: &[AgentCapability::CodeReview],
                    estimated_hours: 1.0,
                },
                PhaseTemplate {
                    key: "planning",
                    title: "Refactoring Plan",
                    description: "Plan refactoring approach",
                    capabilities: &[AgentCapability::SystemDesign],
                    estimated_hours: 2.0,
                },
                PhaseTemplate {
                    key: "execution",
                    title: "Refactoring Execution",
                    description: "Execute refactoring changes",
                    capabilities: &[AgentCapability::Refactoring],
                    estimated_hours: 4.0,
                },
                PhaseTemplate {
                    key: "verification",
                    title: "Verification",
                    description: "Verify behavior is unchanged",
                    capabilities: &[AgentCapability::TestGeneration],
                    estimated_hours: 2.0,
                },
            ],
        },
    ]
}
