//! GANTRY Tasks - Graph Algorithms and Decomposition
//!
//! Dependency-graph construction, cycle detection, topological ordering,
//! and critical-path analysis over task trees, plus the decomposition
//! engine that expands complex tasks via strategies, named templates, and
//! regex rules.

mod analyzer;
mod decompose;
mod graph;
mod rules;
mod service;
mod templates;

pub use analyzer::{
    analyze_requirements_text, estimate_from_task_description, infer_capabilities, TextAnalysis,
};
pub use decompose::{decompose_task, DecompositionStrategy};
pub use graph::{
    can_start, dependency_satisfied_for_start, DependencyGraph, MAX_HIERARCHY_DEPTH,
};
pub use rules::{default_rules, DecompositionRule, ExpansionPattern};
pub use service::{DecompositionEngine, DecompositionOptions};
pub use templates::{default_templates, DecompositionTemplate, PhaseTemplate};
