//! Registered agent record and performance tracking.
//!
//! `RegisteredAgent` is the lightweight runtime registration used by the
//! registry and router; performance history lives in `AgentPerformance` and
//! drives tier derivation and the circuit breaker.

use crate::capability::{AgentCapability, AgentType};
use crate::error::ValidationError;
use crate::identity::{AgentId, EntityIdType, TenantId, Timestamp};
use crate::{LoadLevel, PerformanceTier};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Capacity bounds for a registered agent.
pub const MIN_CONCURRENT_TASKS: i32 = 1;
pub const MAX_CONCURRENT_TASKS: i32 = 50;

/// Agent names rejected as too generic when they are not `AGENT-` prefixed.
const GENERIC_NAME_FRAGMENTS: [&str; 4] = ["ai assistant", "bot", "helper", "some agent"];

// ============================================================================
// PERFORMANCE RECORD
// ============================================================================

/// Rolling performance record for an agent.
///
/// Averages are cumulative means over all recorded tasks; success rate
/// counts partial successes at half weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentPerformance {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub partially_successful_tasks: u64,

    // Quality metrics, all in [0, 1]
    pub average_quality_score: f64,

    // Efficiency metrics
    pub average_execution_time_seconds: f64,
    pub tokens_per_task: f64,
    pub cost_per_task_usd: f64,

    // Specialization metrics
    #[serde(default)]
    pub capability_success_rates: HashMap<AgentCapability, f64>,
    #[serde(default)]
    pub technology_success_rates: HashMap<String, f64>,
}

/// Outcome of one task execution, fed into [`AgentPerformance::record`].
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    pub success: bool,
    pub partial_success: bool,
    pub quality_score: Option<f64>,
    pub execution_time_seconds: Option<f64>,
    pub tokens_used: Option<u64>,
    pub cost_usd: Option<f64>,
    pub capabilities_used: Vec<AgentCapability>,
    pub technologies: Vec<String>,
}

impl AgentPerformance {
    /// Overall success rate: `(successful + 0.5 * partial) / total`.
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        (self.successful_tasks as f64 + self.partially_successful_tasks as f64 * 0.5)
            / self.total_tasks as f64
    }

    /// Success rate excluding partial successes.
    pub fn complete_success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.successful_tasks as f64 / self.total_tasks as f64
    }

    /// Derive the performance tier from the rolling record.
    pub fn tier(&self) -> PerformanceTier {
        let rate = self.success_rate();
        if rate >= 0.95 && self.average_quality_score >= 0.9 {
            PerformanceTier::Elite
        } else if rate >= 0.85 {
            PerformanceTier::Advanced
        } else if rate >= 0.70 {
            PerformanceTier::Competent
        } else if rate >= 0.50 {
            PerformanceTier::Trainee
        } else {
            PerformanceTier::Degraded
        }
    }

    /// Record one task outcome, updating counters and cumulative averages.
    pub fn record(&mut self, outcome: &TaskOutcome) {
        self.total_tasks += 1;

        if outcome.success && !outcome.partial_success {
            self.successful_tasks += 1;
        } else if outcome.partial_success {
            self.partially_successful_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }

        let n = self.total_tasks as f64;
        let prev = n - 1.0;

        if let Some(quality) = outcome.quality_score {
            self.average_quality_score = (self.average_quality_score * prev + quality) / n;
        }
        if let Some(seconds) = outcome.execution_time_seconds {
            self.average_execution_time_seconds =
                (self.average_execution_time_seconds * prev + seconds) / n;
        }
        if let Some(tokens) = outcome.tokens_used {
            self.tokens_per_task = (self.tokens_per_task * prev + tokens as f64) / n;
        }
        if let Some(cost) = outcome.cost_usd {
            self.cost_per_task_usd = (self.cost_per_task_usd * prev + cost) / n;
        }

        let hit = if outcome.success { 1.0 } else { 0.0 };
        for capability in &outcome.capabilities_used {
            let rate = self
                .capability_success_rates
                .entry(*capability)
                .or_insert(0.0);
            *rate = (*rate * prev + hit) / n;
        }
        for tech in &outcome.technologies {
            let rate = self
                .technology_success_rates
                .entry(tech.clone())
                .or_insert(0.0);
            *rate = (*rate * prev + hit) / n;
        }
    }
}

// ============================================================================
// REGISTERED AGENT
// ============================================================================

/// Runtime registration record for capability-based routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredAgent {
    pub id: AgentId,
    pub tenant_id: TenantId,
    pub name: String,
    pub agent_type: AgentType,
    pub capabilities: HashSet<AgentCapability>,
    #[serde(default)]
    pub preferred_technologies: Vec<String>,
    pub performance_tier: PerformanceTier,
    pub load_level: LoadLevel,
    pub current_tasks: i32,
    pub max_concurrent_tasks: i32,
    pub last_heartbeat: Timestamp,
    /// Carries `is_external`, `endpoint_url`, `auth_token`, `agent_type`
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl RegisteredAgent {
    /// Create a registration after validating name, capabilities, and
    /// capacity bounds.
    pub fn new(
        tenant_id: TenantId,
        name: &str,
        agent_type: AgentType,
        capabilities: HashSet<AgentCapability>,
        max_concurrent_tasks: i32,
    ) -> Result<Self, ValidationError> {
        let name = validate_agent_name(name)?;

        if capabilities.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "capabilities".into(),
            });
        }

        if !(MIN_CONCURRENT_TASKS..=MAX_CONCURRENT_TASKS).contains(&max_concurrent_tasks) {
            return Err(ValidationError::OutOfRange {
                field: "max_concurrent_tasks".into(),
                value: max_concurrent_tasks as f64,
                min: MIN_CONCURRENT_TASKS as f64,
                max: MAX_CONCURRENT_TASKS as f64,
            });
        }

        validate_primary_capabilities(agent_type, &capabilities)?;

        Ok(Self {
            id: AgentId::now_v7(),
            tenant_id,
            name,
            agent_type,
            capabilities,
            preferred_technologies: Vec::new(),
            performance_tier: PerformanceTier::Competent,
            load_level: LoadLevel::Idle,
            current_tasks: 0,
            max_concurrent_tasks,
            last_heartbeat: Utc::now(),
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_technologies(mut self, technologies: Vec<String>) -> Self {
        self.preferred_technologies = technologies;
        self
    }

    /// Whether this agent can accept new tasks: below capacity, not
    /// overloaded, not circuit-broken.
    pub fn is_available(&self) -> bool {
        self.current_tasks < self.max_concurrent_tasks
            && self.load_level != LoadLevel::Overloaded
            && self.performance_tier != PerformanceTier::Degraded
    }

    /// Current utilization in [0, ..], 1.0 meaning at capacity.
    pub fn utilization(&self) -> f64 {
        if self.max_concurrent_tasks == 0 {
            return 1.0;
        }
        self.current_tasks as f64 / self.max_concurrent_tasks as f64
    }

    pub fn has_capability(&self, capability: AgentCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn has_all_capabilities(&self, required: &[AgentCapability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    /// Whether the agent is driven over the external agent protocol.
    pub fn is_external(&self) -> bool {
        self.metadata
            .get("is_external")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// EAP endpoint URL, for external agents.
    pub fn endpoint_url(&self) -> Option<&str> {
        self.metadata.get("endpoint_url").and_then(Value::as_str)
    }

    /// EAP auth token, for external agents.
    pub fn auth_token(&self) -> Option<&str> {
        self.metadata.get("auth_token").and_then(Value::as_str)
    }

    /// Age of the last heartbeat in seconds.
    pub fn heartbeat_age_seconds(&self, now: Timestamp) -> f64 {
        (now - self.last_heartbeat).num_milliseconds() as f64 / 1000.0
    }
}

/// Enforce the `AGENT-...` pattern or a non-generic descriptive name.
pub fn validate_agent_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "name".into(),
        });
    }
    if trimmed.len() > 100 {
        return Err(ValidationError::InvalidValue {
            field: "name".into(),
            reason: format!("length {} exceeds 100", trimmed.len()),
        });
    }

    if trimmed.starts_with("AGENT-") {
        return Ok(trimmed.to_string());
    }

    let lower = trimmed.to_lowercase();
    if GENERIC_NAME_FRAGMENTS.iter().any(|g| lower == *g) {
        return Err(ValidationError::InvalidValue {
            field: "name".into(),
            reason: format!("'{trimmed}' is too generic; use descriptive, unique naming"),
        });
    }

    Ok(trimmed.to_string())
}

/// A primary capability unknown to the agent's type fails validation.
/// Types without a table row (analyst, optimizer) are unconstrained.
pub fn validate_primary_capabilities(
    agent_type: AgentType,
    capabilities: &HashSet<AgentCapability>,
) -> Result<(), ValidationError> {
    let Some(allowed) = agent_type.allowed_primary_capabilities() else {
        return Ok(());
    };

    for capability in capabilities {
        if !allowed.contains(capability) {
            return Err(ValidationError::InvalidValue {
                field: "capabilities".into(),
                reason: format!(
                    "capability '{capability}' not allowed for agent type '{agent_type}'"
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityIdType;

    fn implementer(caps: &[AgentCapability]) -> RegisteredAgent {
        RegisteredAgent::new(
            TenantId::now_v7(),
            "AGENT-IMPL-01",
            AgentType::Implementer,
            caps.iter().copied().collect(),
            5,
        )
        .expect("valid agent")
    }

    #[test]
    fn test_capability_validity_by_type() {
        let result = RegisteredAgent::new(
            TenantId::now_v7(),
            "AGENT-IMPL-02",
            AgentType::Implementer,
            HashSet::from([AgentCapability::Deployment]),
            5,
        );
        assert!(result.is_err());

        let agent = implementer(&[AgentCapability::CodeGeneration]);
        assert!(agent.has_capability(AgentCapability::CodeGeneration));
    }

    #[test]
    fn test_capacity_bounds() {
        let result = RegisteredAgent::new(
            TenantId::now_v7(),
            "AGENT-IMPL-03",
            AgentType::Implementer,
            HashSet::from([AgentCapability::CodeGeneration]),
            0,
        );
        assert!(result.is_err());

        let result = RegisteredAgent::new(
            TenantId::now_v7(),
            "AGENT-IMPL-04",
            AgentType::Implementer,
            HashSet::from([AgentCapability::CodeGeneration]),
            51,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_generic_names_rejected() {
        for name in ["bot", "AI Assistant", "helper"] {
            assert!(validate_agent_name(name).is_err(), "{name} should be rejected");
        }
        assert!(validate_agent_name("AGENT-REVIEWER-7").is_ok());
        assert!(validate_agent_name("Mercury Code Surgeon").is_ok());
    }

    #[test]
    fn test_availability() {
        let mut agent = implementer(&[AgentCapability::CodeGeneration]);
        assert!(agent.is_available());

        agent.current_tasks = agent.max_concurrent_tasks;
        assert!(!agent.is_available());

        agent.current_tasks = 0;
        agent.performance_tier = PerformanceTier::Degraded;
        assert!(!agent.is_available());

        agent.performance_tier = PerformanceTier::Competent;
        agent.load_level = LoadLevel::Overloaded;
        assert!(!agent.is_available());
    }

    #[test]
    fn test_success_rate_with_partials() {
        let mut perf = AgentPerformance::default();
        for _ in 0..6 {
            perf.record(&TaskOutcome {
                success: true,
                ..Default::default()
            });
        }
        perf.record(&TaskOutcome {
            partial_success: true,
            ..Default::default()
        });
        perf.record(&TaskOutcome::default()); // failure

        // (6 + 0.5) / 8
        assert!((perf.success_rate() - 0.8125).abs() < 1e-9);
        assert!((perf.complete_success_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_tier_derivation() {
        let mut perf = AgentPerformance::default();
        assert_eq!(perf.tier(), PerformanceTier::Degraded);

        for _ in 0..20 {
            perf.record(&TaskOutcome {
                success: true,
                quality_score: Some(0.95),
                ..Default::default()
            });
        }
        assert_eq!(perf.tier(), PerformanceTier::Elite);

        for _ in 0..4 {
            perf.record(&TaskOutcome::default());
        }
        // 20 / 24 ≈ 0.83 -> competent
        assert_eq!(perf.tier(), PerformanceTier::Competent);
    }

    #[test]
    fn test_cumulative_averages() {
        let mut perf = AgentPerformance::default();
        perf.record(&TaskOutcome {
            success: true,
            execution_time_seconds: Some(100.0),
            tokens_used: Some(1000),
            ..Default::default()
        });
        perf.record(&TaskOutcome {
            success: true,
            execution_time_seconds: Some(200.0),
            tokens_used: Some(3000),
            ..Default::default()
        });

        assert!((perf.average_execution_time_seconds - 150.0).abs() < 1e-9);
        assert!((perf.tokens_per_task - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_external_metadata_accessors() {
        let mut agent = implementer(&[AgentCapability::CodeGeneration]);
        assert!(!agent.is_external());

        agent.metadata.insert("is_external".into(), Value::Bool(true));
        agent
            .metadata
            .insert("endpoint_url".into(), Value::from("http://x/agent"));
        agent.metadata.insert("auth_token".into(), Value::from("k"));

        assert!(agent.is_external());
        assert_eq!(agent.endpoint_url(), Some("http://x/agent"));
        assert_eq!(agent.auth_token(), Some("k"));
    }
}
