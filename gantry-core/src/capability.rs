//! Agent specialization types and the closed capability vocabulary.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Agent specialization types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// System design and planning
    Architect,
    /// Code generation and implementation
    Implementer,
    /// Code review and quality assurance
    Reviewer,
    /// Problem diagnosis and fixing
    Debugger,
    /// System integration and deployment
    Integrator,
    /// Multi-agent coordination
    Orchestrator,
    /// Requirements analysis
    Analyst,
    /// Performance optimization
    Optimizer,
}

impl AgentType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentType::Architect => "architect",
            AgentType::Implementer => "implementer",
            AgentType::Reviewer => "reviewer",
            AgentType::Debugger => "debugger",
            AgentType::Integrator => "integrator",
            AgentType::Orchestrator => "orchestrator",
            AgentType::Analyst => "analyst",
            AgentType::Optimizer => "optimizer",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, AgentTypeParseError> {
        match s {
            "architect" => Ok(AgentType::Architect),
            "implementer" => Ok(AgentType::Implementer),
            "reviewer" => Ok(AgentType::Reviewer),
            "debugger" => Ok(AgentType::Debugger),
            "integrator" => Ok(AgentType::Integrator),
            "orchestrator" => Ok(AgentType::Orchestrator),
            "analyst" => Ok(AgentType::Analyst),
            "optimizer" => Ok(AgentType::Optimizer),
            _ => Err(AgentTypeParseError(s.to_string())),
        }
    }

    /// Primary capabilities permitted for this agent type.
    ///
    /// `Analyst` and `Optimizer` are unconstrained and return `None`.
    pub fn allowed_primary_capabilities(&self) -> Option<&'static HashSet<AgentCapability>> {
        TYPE_CAPABILITY_MAP.get(self)
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for AgentType {
    type Err = AgentTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid agent type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTypeParseError(pub String);

impl fmt::Display for AgentTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid agent type: {}", self.0)
    }
}

impl std::error::Error for AgentTypeParseError {}

/// Specific capabilities an agent can possess. Closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    // Planning & Architecture
    RequirementsAnalysis,
    SystemDesign,
    ArchitecturePlanning,
    TaskDecomposition,

    // Implementation
    CodeGeneration,
    TestGeneration,
    Testing,
    Documentation,
    Refactoring,

    // Quality Assurance
    CodeReview,
    SecurityAudit,
    PerformanceAnalysis,
    ComplianceCheck,

    // Problem Solving
    Debugging,
    BugFixing,
    Troubleshooting,
    RootCauseAnalysis,
    Optimization,

    // Integration & Operations
    Deployment,
    Configuration,
    Monitoring,
    Scaling,

    // Coordination
    WorkflowOrchestration,
    ResourceAllocation,
    ConflictResolution,
    ProgressTracking,
}

impl AgentCapability {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentCapability::RequirementsAnalysis => "requirements_analysis",
            AgentCapability::SystemDesign => "system_design",
            AgentCapability::ArchitecturePlanning => "architecture_planning",
            AgentCapability::TaskDecomposition => "task_decomposition",
            AgentCapability::CodeGeneration => "code_generation",
            AgentCapability::TestGeneration => "test_generation",
            AgentCapability::Testing => "testing",
            AgentCapability::Documentation => "documentation",
            AgentCapability::Refactoring => "refactoring",
            AgentCapability::CodeReview => "code_review",
            AgentCapability::SecurityAudit => "security_audit",
            AgentCapability::PerformanceAnalysis => "performance_analysis",
            AgentCapability::ComplianceCheck => "compliance_check",
            AgentCapability::Debugging => "debugging",
            AgentCapability::BugFixing => "bug_fixing",
            AgentCapability::Troubleshooting => "troubleshooting",
            AgentCapability::RootCauseAnalysis => "root_cause_analysis",
            AgentCapability::Optimization => "optimization",
            AgentCapability::Deployment => "deployment",
            AgentCapability::Configuration => "configuration",
            AgentCapability::Monitoring => "monitoring",
            AgentCapability::Scaling => "scaling",
            AgentCapability::WorkflowOrchestration => "workflow_orchestration",
            AgentCapability::ResourceAllocation => "resource_allocation",
            AgentCapability::ConflictResolution => "conflict_resolution",
            AgentCapability::ProgressTracking => "progress_tracking",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, AgentCapabilityParseError> {
        match s {
            "requirements_analysis" => Ok(AgentCapability::RequirementsAnalysis),
            "system_design" => Ok(AgentCapability::SystemDesign),
            "architecture_planning" => Ok(AgentCapability::ArchitecturePlanning),
            "task_decomposition" => Ok(AgentCapability::TaskDecomposition),
            "code_generation" => Ok(AgentCapability::CodeGeneration),
            "test_generation" => Ok(AgentCapability::TestGeneration),
            "testing" => Ok(AgentCapability::Testing),
            "documentation" => Ok(AgentCapability::Documentation),
            "refactoring" => Ok(AgentCapability::Refactoring),
            "code_review" => Ok(AgentCapability::CodeReview),
            "security_audit" => Ok(AgentCapability::SecurityAudit),
            "performance_analysis" => Ok(AgentCapability::PerformanceAnalysis),
            "compliance_check" => Ok(AgentCapability::ComplianceCheck),
            "debugging" => Ok(AgentCapability::Debugging),
            "bug_fixing" => Ok(AgentCapability::BugFixing),
            "troubleshooting" => Ok(AgentCapability::Troubleshooting),
            "root_cause_analysis" => Ok(AgentCapability::RootCauseAnalysis),
            "optimization" => Ok(AgentCapability::Optimization),
            "deployment" => Ok(AgentCapability::Deployment),
            "configuration" => Ok(AgentCapability::Configuration),
            "monitoring" => Ok(AgentCapability::Monitoring),
            "scaling" => Ok(AgentCapability::Scaling),
            "workflow_orchestration" => Ok(AgentCapability::WorkflowOrchestration),
            "resource_allocation" => Ok(AgentCapability::ResourceAllocation),
            "conflict_resolution" => Ok(AgentCapability::ConflictResolution),
            "progress_tracking" => Ok(AgentCapability::ProgressTracking),
            _ => Err(AgentCapabilityParseError(s.to_string())),
        }
    }
}

impl fmt::Display for AgentCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for AgentCapability {
    type Err = AgentCapabilityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid agent capability string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCapabilityParseError(pub String);

impl fmt::Display for AgentCapabilityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid agent capability: {}", self.0)
    }
}

impl std::error::Error for AgentCapabilityParseError {}

/// Primary-capability validity table, keyed by agent type.
///
/// An agent may only declare primary capabilities from its type's row.
/// Secondary capabilities are unconstrained. `Analyst` and `Optimizer` have
/// no row and accept any primary capability.
static TYPE_CAPABILITY_MAP: Lazy<HashMap<AgentType, HashSet<AgentCapability>>> = Lazy::new(|| {
    use AgentCapability::*;
    let mut map = HashMap::new();
    map.insert(
        AgentType::Architect,
        HashSet::from([
            RequirementsAnalysis,
            SystemDesign,
            ArchitecturePlanning,
            TaskDecomposition,
        ]),
    );
    map.insert(
        AgentType::Implementer,
        HashSet::from([CodeGeneration, TestGeneration, Documentation, Refactoring]),
    );
    map.insert(
        AgentType::Reviewer,
        HashSet::from([CodeReview, SecurityAudit, PerformanceAnalysis, ComplianceCheck]),
    );
    map.insert(
        AgentType::Debugger,
        HashSet::from([Debugging, Troubleshooting, RootCauseAnalysis, Optimization]),
    );
    map.insert(
        AgentType::Integrator,
        HashSet::from([Deployment, Configuration, Monitoring, Scaling]),
    );
    map.insert(
        AgentType::Orchestrator,
        HashSet::from([
            WorkflowOrchestration,
            ResourceAllocation,
            ConflictResolution,
            ProgressTracking,
        ]),
    );
    map
});
