//! Regex-driven decomposition rules.
//!
//! Rules match against `title + description` case-insensitively and are
//! applied in descending priority. Each rule expands the task with a named
//! pattern: microservice, CRUD, UI components, or security phases.

use crate::decompose::{decompose_task, title_case, DecompositionStrategy};
use gantry_core::{
    AgentCapability, EstimationSource, Task, TaskComplexity, TaskDependencyKind, TaskEstimate,
    TaskGraphError, TaskPriority,
};
use regex::Regex;

/// A rule's expansion pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpansionPattern {
    /// N services plus shared components; every service takes a
    /// start-to-start dependency on every shared component.
    Microservice {
        service_count: usize,
        shared_components: Vec<String>,
    },
    /// One child per entity operation plus a test child depending
    /// finish-to-start on each operation.
    Crud {
        operations: Vec<String>,
        include_tests: bool,
    },
    /// One child per UI component; forms/tables/charts depend
    /// start-to-start on the layout component.
    UiComponents { components: Vec<String> },
    /// Sequential phases with estimates scaled by the security level.
    Security {
        phases: Vec<String>,
        security_level: String,
    },
    /// Fall back to plain strategy decomposition.
    Default { strategy: DecompositionStrategy },
}

/// A regex-matched decomposition rule.
#[derive(Debug, Clone)]
pub struct DecompositionRule {
    pub pattern: Regex,
    pub name: &'static str,
    pub priority: u8,
    pub expansion: ExpansionPattern,
}

impl DecompositionRule {
    pub fn matches(&self, task: &Task) -> bool {
        let text = format!(
            "{} {}",
            task.title,
            task.description.as_deref().unwrap_or("")
        );
        self.pattern.is_match(&text)
    }

    /// Apply the rule's expansion to `task`. Returns the number of children
    /// created.
    pub fn apply(&self, task: &mut Task) -> Result<usize, TaskGraphError> {
        let created = match &self.expansion {
            ExpansionPattern::Microservice {
                service_count,
                shared_components,
            } => expand_microservice(task, *service_count, shared_components)?,
            ExpansionPattern::Crud {
                operations,
                include_tests,
            } => expand_crud(task, operations, *include_tests)?,
            ExpansionPattern::UiComponents { components } => {
                expand_ui_components(task, components)?
            }
            ExpansionPattern::Security {
                phases,
                security_level,
            } => expand_security(task, phases, security_level)?,
            ExpansionPattern::Default { strategy } => decompose_task(
                task,
                *strategy,
                3,
                TaskComplexity::Moderate,
            )?,
        };
        tracing::debug!(rule = self.name, created, "applied decomposition rule");
        Ok(created)
    }
}

/// Built-in rules, already sorted by descending priority.
pub fn default_rules() -> Vec<DecompositionRule> {
    let mut rules = vec![
        DecompositionRule {
            pattern: regex(r"(?i)(auth|authentication|security)"),
            name: "security_pattern",
            priority: 6,
            expansion: ExpansionPattern::Security {
                phases: ["design", "implementation", "testing", "audit"]
                    .map(String::from)
                    .to_vec(),
                security_level: "high".to_string(),
            },
        },
        DecompositionRule {
            pattern: regex(r"(?i)(microservice|distributed)"),
            name: "microservice_pattern",
            priority: 5,
            expansion: ExpansionPattern::Microservice {
                service_count: 3,
                shared_components: ["auth", "database", "api_gateway"]
                    .map(String::from)
                    .to_vec(),
            },
        },
        DecompositionRule {
            pattern: regex(r"(?i)(CRUD|database|model)"),
            name: "crud_pattern",
            priority: 4,
            expansion: ExpansionPattern::Crud {
                operations: ["create", "read", "update", "delete"]
                    .map(String::from)
                    .to_vec(),
                include_tests: true,
            },
        },
        DecompositionRule {
            pattern: regex(r"(?i)(UI|frontend|interface)"),
            name: "ui_components",
            priority: 4,
            expansion: ExpansionPattern::UiComponents {
                components: ["layout", "navigation", "forms", "tables", "charts"]
                    .map(String::from)
                    .to_vec(),
            },
        },
    ];
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    rules
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("rule pattern {pattern}: {e}"))
}

fn rule_child(
    task: &Task,
    title: &str,
    description: &str,
    task_type: &str,
    hours: f64,
    capabilities: Vec<AgentCapability>,
    priority: TaskPriority,
) -> Result<Task, TaskGraphError> {
    Ok(Task::new(task.tenant_id, task.session_id, title)
        .map_err(|e| TaskGraphError::DecompositionFailed {
            reason: e.to_string(),
        })?
        .with_description(description)
        .with_task_type(task_type)
        .with_priority(priority)
        .with_estimate(TaskEstimate {
            likely_hours: hours,
            required_capabilities: capabilities,
            confidence: 0.6,
            source: EstimationSource::Decomposition,
            ..Default::default()
        }))
}

fn expand_microservice(
    task: &mut Task,
    service_count: usize,
    shared_components: &[String],
) -> Result<usize, TaskGraphError> {
    let total = service_count + shared_components.len();
    let share = task.estimate.likely_hours / total.max(1) as f64;

    let mut services = Vec::with_capacity(service_count);
    for i in 0..service_count {
        services.push(rule_child(
            task,
            &format!("{} - Service {}", task.title, i + 1),
            &format!("Microservice {} implementation", i + 1),
            "microservice",
            share,
            vec![AgentCapability::CodeGeneration, AgentCapability::Deployment],
            task.priority,
        )?);
    }

    let component_share = if shared_components.is_empty() {
        0.0
    } else {
        task.estimate.likely_hours * 0.5 / shared_components.len() as f64
    };

    let mut components = Vec::with_capacity(shared_components.len());
    for name in shared_components {
        let component = rule_child(
            task,
            &format!("{} - {} Component", task.title, title_case(name)),
            &format!("Shared {name} component for microservices"),
            "shared_component",
            component_share,
            vec![AgentCapability::CodeGeneration, AgentCapability::SystemDesign],
            task.priority,
        )?;

        // Every service starts only once the shared component has started
        for service in &mut services {
            service.add_dependency(
                component.id,
                TaskDependencyKind::StartToStart,
                Some(format!("Requires {name} component")),
            )?;
        }
        components.push(component);
    }

    let created = services.len() + components.len();
    for child in services.into_iter().chain(components) {
        task.add_child(child);
    }
    Ok(created)
}

fn expand_crud(
    task: &mut Task,
    operations: &[String],
    include_tests: bool,
) -> Result<usize, TaskGraphError> {
    let share = task.estimate.likely_hours / operations.len().max(1) as f64;

    let mut children = Vec::with_capacity(operations.len() + 1);
    for operation in operations {
        children.push(rule_child(
            task,
            &format!("{} - {}", task.title, title_case(operation)),
            &format!("{} operation implementation", title_case(operation)),
            "crud_operation",
            share,
            vec![AgentCapability::CodeGeneration],
            task.priority,
        )?);
    }

    if include_tests {
        let mut test_task = rule_child(
            task,
            &format!("{} - Tests", task.title),
            "CRUD operation tests",
            "testing",
            task.estimate.likely_hours * 0.3,
            vec![AgentCapability::TestGeneration],
            task.priority,
        )?;
        for operation in &children {
            test_task.add_dependency(
                operation.id,
                TaskDependencyKind::FinishToStart,
                Some(format!("Test depends on {}", operation.title)),
            )?;
        }
        children.push(test_task);
    }

    let created = children.len();
    for child in children {
        task.add_child(child);
    }
    Ok(created)
}

fn expand_ui_components(task: &mut Task, components: &[String]) -> Result<usize, TaskGraphError> {
    let share = task.estimate.likely_hours / components.len().max(1) as f64;
    let mut children: Vec<Task> = Vec::with_capacity(components.len());

    for name in components {
        let mut child = rule_child(
            task,
            &format!("{} - {} Component", task.title, title_case(name)),
            &format!("UI {name} component implementation"),
            "ui_component",
            share,
            vec![AgentCapability::CodeGeneration],
            task.priority,
        )?;

        if matches!(name.as_str(), "forms" | "tables" | "charts") {
            if let Some(layout) = children
                .iter()
                .find(|c| c.title.to_lowercase().contains("layout"))
            {
                child.add_dependency(
                    layout.id,
                    TaskDependencyKind::StartToStart,
                    Some("Requires layout component".to_string()),
                )?;
            }
        }
        children.push(child);
    }

    let created = children.len();
    for child in children {
        task.add_child(child);
    }
    Ok(created)
}

fn expand_security(
    task: &mut Task,
    phases: &[String],
    security_level: &str,
) -> Result<usize, TaskGraphError> {
    let multiplier = match security_level {
        "low" => 0.5,
        "medium" => 1.0,
        "high" => 1.5,
        "critical" => 2.0,
        _ => 1.0,
    };
    let share = task.estimate.likely_hours * multiplier / phases.len().max(1) as f64;
    let priority = if matches!(security_level, "high" | "critical") {
        TaskPriority::High
    } else {
        task.priority
    };

    let mut children: Vec<Task> = Vec::with_capacity(phases.len());
    for phase in phases {
        let mut child = rule_child(
            task,
            &format!("{} - {}", task.title, title_case(phase)),
            &format!("Security {phase} phase"),
            &format!("security_{phase}"),
            share,
            security_phase_capabilities(phase),
            priority,
        )?;

        if let Some(previous) = children.last() {
            child.add_dependency(
                previous.id,
                TaskDependencyKind::FinishToStart,
                Some(format!("Depends on {}", previous.title)),
            )?;
        }
        children.push(child);
    }

    let created = children.len();
    for child in children {
        task.add_child(child);
    }
    Ok(created)
}

fn security_phase_capabilities(phase: &str) -> Vec<AgentCapability> {
    match phase {
        "design" => vec![AgentCapability::SystemDesign, AgentCapability::SecurityAudit],
        "implementation" => vec![AgentCapability::CodeGeneration, AgentCapability::SecurityAudit],
        "testing" => vec![AgentCapability::TestGeneration, AgentCapability::SecurityAudit],
        "audit" => vec![AgentCapability::SecurityAudit, AgentCapability::CodeReview],
        _ => vec![AgentCapability::CodeGeneration],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{EntityIdType, SessionId, TenantId};

    fn task(title: &str, hours: f64) -> Task {
        let mut t = Task::new(TenantId::now_v7(), SessionId::now_v7(), title).expect("task");
        t.estimate = TaskEstimate::likely(hours);
        t
    }

    fn rule_named(name: &str) -> DecompositionRule {
        default_rules()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("rule {name} exists"))
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let rules = default_rules();
        assert_eq!(rules[0].name, "security_pattern");
        for window in rules.windows(2) {
            assert!(window[0].priority >= window[1].priority);
        }
    }

    #[test]
    fn test_microservice_expansion() {
        let rule = rule_named("microservice_pattern");
        let mut root = task("Implement microservice", 9.0);
        assert!(rule.matches(&root));

        let created = rule.apply(&mut root).expect("apply");
        assert_eq!(created, 6);

        let services: Vec<&Task> = root
            .children
            .iter()
            .filter(|c| c.task_type == "microservice")
            .collect();
        let components: Vec<&Task> = root
            .children
            .iter()
            .filter(|c| c.task_type == "shared_component")
            .collect();
        assert_eq!(services.len(), 3);
        assert_eq!(components.len(), 3);

        // Every service start-to-start depends on all three components
        for service in services {
            assert_eq!(service.dependencies.len(), 3);
            for dep in &service.dependencies {
                assert_eq!(dep.kind, TaskDependencyKind::StartToStart);
                assert!(components.iter().any(|c| c.id == dep.target_task_id));
            }
        }
    }

    #[test]
    fn test_crud_expansion_with_tests() {
        let rule = rule_named("crud_pattern");
        let mut root = task("Implement user model", 4.0);
        assert!(rule.matches(&root));

        let created = rule.apply(&mut root).expect("apply");
        assert_eq!(created, 5);

        let tests = root
            .children
            .iter()
            .find(|c| c.task_type == "testing")
            .expect("test child");
        assert_eq!(tests.dependencies.len(), 4);
        for dep in &tests.dependencies {
            assert_eq!(dep.kind, TaskDependencyKind::FinishToStart);
        }
    }

    #[test]
    fn test_ui_components_depend_on_layout() {
        let rule = rule_named("ui_components");
        let mut root = task("Implement dashboard UI", 5.0);
        rule.apply(&mut root).expect("apply");

        let layout_id = root
            .children
            .iter()
            .find(|c| c.title.contains("Layout"))
            .expect("layout child")
            .id;

        for name in ["Forms", "Tables", "Charts"] {
            let child = root
                .children
                .iter()
                .find(|c| c.title.contains(name))
                .unwrap_or_else(|| panic!("{name} child"));
            assert_eq!(child.dependencies.len(), 1);
            assert_eq!(child.dependencies[0].target_task_id, layout_id);
            assert_eq!(child.dependencies[0].kind, TaskDependencyKind::StartToStart);
        }

        let navigation = root
            .children
            .iter()
            .find(|c| c.title.contains("Navigation"))
            .expect("navigation child");
        assert!(navigation.dependencies.is_empty());
    }

    #[test]
    fn test_security_expansion_scales_and_chains() {
        let rule = rule_named("security_pattern");
        let mut root = task("Implement authentication flow", 8.0);
        assert!(rule.matches(&root));

        rule.apply(&mut root).expect("apply");
        assert_eq!(root.children.len(), 4);

        // High security level: 8 * 1.5 / 4 = 3 hours per phase, High priority
        for child in &root.children {
            assert!((child.estimate.likely_hours - 3.0).abs() < 1e-9);
            assert_eq!(child.priority, TaskPriority::High);
        }

        // Sequential finish-to-start chain
        assert!(root.children[0].dependencies.is_empty());
        for window in root.children.windows(2) {
            assert_eq!(window[1].dependencies[0].target_task_id, window[0].id);
            assert_eq!(
                window[1].dependencies[0].kind,
                TaskDependencyKind::FinishToStart
            );
        }
    }

    #[test]
    fn test_rule_matching_uses_description_too() {
        let rule = rule_named("microservice_pattern");
        let mut t = task("Implement platform", 6.0);
        assert!(!rule.matches(&t));
        t.description = Some("split the distributed workers".to_string());
        assert!(rule.matches(&t));
    }
}
