//! Decomposition engine: analysis, template and rule application, and
//! post-expansion validation.

use crate::analyzer::estimate_from_task_description;
use crate::decompose::{decompose_task, DecompositionStrategy};
use crate::graph::DependencyGraph;
use crate::rules::{default_rules, DecompositionRule};
use crate::templates::{default_templates, DecompositionTemplate};
use gantry_core::{GantryResult, Task, TaskComplexity};

/// Options for one analyze-and-decompose pass.
#[derive(Debug, Clone)]
pub struct DecompositionOptions {
    pub auto_estimate: bool,
    pub apply_templates: bool,
    pub apply_rules: bool,
    pub max_depth: usize,
}

impl Default for DecompositionOptions {
    fn default() -> Self {
        Self {
            auto_estimate: true,
            apply_templates: true,
            apply_rules: true,
            max_depth: 3,
        }
    }
}

/// Template- and rule-driven expansion of complex tasks into subtask DAGs.
pub struct DecompositionEngine {
    templates: Vec<DecompositionTemplate>,
    rules: Vec<DecompositionRule>,
}

impl Default for DecompositionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DecompositionEngine {
    pub fn new() -> Self {
        Self {
            templates: default_templates(),
            rules: default_rules(),
        }
    }

    pub fn with_templates(mut self, templates: Vec<DecompositionTemplate>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_rules(mut self, mut rules: Vec<DecompositionRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        self.rules = rules;
        self
    }

    /// Full pipeline: auto-estimate, templates, rules, recursive descent,
    /// then cycle/depth validation. On validation failure the error is
    /// returned and the caller should discard the mutated copy; the stored
    /// task remains in its pre-decomposition state.
    pub fn analyze_and_decompose(
        &self,
        task: &mut Task,
        options: &DecompositionOptions,
    ) -> GantryResult<()> {
        tracing::info!(task = task.title.as_str(), task_id = %task.id, "analyzing task");

        if options.auto_estimate && task.estimate.confidence < 0.5 {
            task.estimate = estimate_from_task_description(task);
            tracing::debug!(
                expected_hours = task.estimate.expected_hours(),
                "auto-estimated task"
            );
        }

        if options.apply_templates {
            for template in &self.templates {
                template.apply_to_task(task)?;
            }
        }

        if options.apply_rules {
            for rule in &self.rules {
                if rule.matches(task) {
                    rule.apply(task)?;
                }
            }
        }

        if options.max_depth > 0 {
            let child_options = DecompositionOptions {
                max_depth: options.max_depth - 1,
                ..options.clone()
            };
            for child in &mut task.children {
                if child.estimate.complexity() >= TaskComplexity::Moderate {
                    self.analyze_and_decompose(child, &child_options)?;
                }
            }
        }

        DependencyGraph::validate(task)?;

        tracing::info!(
            subtasks = task.count_subtasks(None),
            depth = task.depth(),
            "decomposition complete"
        );
        Ok(())
    }

    /// Plain strategy decomposition without templates or rules.
    pub fn decompose_by_strategy(
        &self,
        task: &mut Task,
        strategy: DecompositionStrategy,
        max_depth: usize,
        target: TaskComplexity,
    ) -> GantryResult<usize> {
        let created = decompose_task(task, strategy, max_depth, target)?;
        DependencyGraph::validate(task)?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{
        EntityIdType, SessionId, TaskDependencyKind, TaskEstimate, TaskGraphError, TenantId,
    };

    fn task(title: &str, hours: f64) -> Task {
        let mut t = Task::new(TenantId::now_v7(), SessionId::now_v7(), title).expect("task");
        t.estimate = TaskEstimate {
            likely_hours: hours,
            confidence: 0.9,
            ..Default::default()
        };
        t
    }

    #[test]
    fn test_microservice_rule_applied_through_engine() {
        let engine = DecompositionEngine::new();
        let mut root = task("Implement microservice", 9.0);

        engine
            .analyze_and_decompose(&mut root, &DecompositionOptions::default())
            .expect("decompose");

        let direct_services = root
            .children
            .iter()
            .filter(|c| c.task_type == "microservice")
            .count();
        assert_eq!(direct_services, 3);
        assert!(root.children.len() >= 6);
    }

    #[test]
    fn test_auto_estimate_fills_low_confidence() {
        let engine = DecompositionEngine::new();
        let mut root = Task::new(
            TenantId::now_v7(),
            SessionId::now_v7(),
            "Implement search indexing",
        )
        .expect("task")
        .with_description("implement the inverted index builder and integrate the API");
        root.estimate.confidence = 0.2;

        engine
            .analyze_and_decompose(&mut root, &DecompositionOptions::default())
            .expect("decompose");
        assert!(root.estimate.confidence >= 0.3);
        assert!(!root.estimate.required_capabilities.is_empty());
    }

    #[test]
    fn test_cycle_after_manual_edge_is_rejected() {
        let engine = DecompositionEngine::new();
        let mut root = task("Implement microservice", 9.0);
        engine
            .analyze_and_decompose(&mut root, &DecompositionOptions::default())
            .expect("decompose");

        // Manually wire a back edge: component depends on a service that
        // already start-to-start depends on the component.
        let service_id = root
            .children
            .iter()
            .find(|c| c.task_type == "microservice")
            .expect("service")
            .id;
        let component = root
            .children
            .iter_mut()
            .find(|c| c.task_type == "shared_component")
            .expect("component");
        component
            .add_dependency(service_id, TaskDependencyKind::FinishToStart, None)
            .expect("edge accepted at entity level");

        let err = DependencyGraph::validate(&root).unwrap_err();
        assert!(matches!(err, TaskGraphError::DependencyCycle { .. }));
    }

    #[test]
    fn test_strategy_decomposition_entry_point() {
        let engine = DecompositionEngine::new();
        let mut root = task("Implement ingestion pipeline", 12.0);
        let created = engine
            .decompose_by_strategy(
                &mut root,
                DecompositionStrategy::Temporal,
                1,
                TaskComplexity::Moderate,
            )
            .expect("decompose");
        assert_eq!(created, 3);
    }
}
