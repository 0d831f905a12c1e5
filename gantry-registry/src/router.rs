//! Capability-based agent router with weighted scoring and circuit breaking.
//!
//! Candidate construction prefers the local registry; when it comes up
//! empty, per-capability queries against the durable directory are
//! intersected. Scoring weights: tier 0.4, capability match 0.3, load 0.2,
//! availability 0.1, plus preference bonuses applied after normalization.

use crate::registry::AgentRegistry;
use async_trait::async_trait;
use gantry_core::{
    AgentCapability, AgentId, AgentPerformance, CapacityError, GantryResult, LoadLevel,
    PerformanceTier, RegisteredAgent,
};
use std::sync::Arc;

// Routing weights
const WEIGHT_PERFORMANCE_TIER: f64 = 0.4;
const WEIGHT_CAPABILITY_MATCH: f64 = 0.3;
const WEIGHT_LOAD_LEVEL: f64 = 0.2;
const WEIGHT_AVAILABILITY: f64 = 0.1;

const PREFERRED_ID_BONUS: f64 = 0.10;
const PREFERRED_TYPE_BONUS: f64 = 0.05;

// Circuit breaker thresholds
const CIRCUIT_BREAKER_MIN_TASKS: u64 = 5;
const CIRCUIT_BREAKER_OPEN_BELOW: f64 = 0.3;
const CIRCUIT_BREAKER_CLOSE_ABOVE: f64 = 0.5;

/// Durable agent lookup used when the local registry has no candidates.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Agents holding one capability, already filtered to available.
    async fn find_by_capability(
        &self,
        capability: AgentCapability,
    ) -> GantryResult<Vec<RegisteredAgent>>;
}

/// A routing request.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub required_capabilities: Vec<AgentCapability>,
    pub preferred_agent_type: Option<String>,
    pub preferred_agent_ids: Vec<AgentId>,
    pub min_performance_tier: Option<PerformanceTier>,
    pub estimated_complexity: f64,
}

impl RouteRequest {
    pub fn for_capabilities(capabilities: &[AgentCapability]) -> Self {
        Self {
            required_capabilities: capabilities.to_vec(),
            estimated_complexity: 1.0,
            ..Default::default()
        }
    }
}

/// The routing outcome: winner, score, up to three alternatives, and a
/// human-readable reason.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub selected: RegisteredAgent,
    pub score: f64,
    pub alternatives: Vec<RegisteredAgent>,
    pub reason: String,
}

/// Result of a workload-rebalance scan. Actual reassignment is a service
/// layer concern; the router only reports intent.
#[derive(Debug, Clone, Default)]
pub struct RebalanceReport {
    pub agents_affected: Vec<AgentId>,
    pub before_utilization: f64,
    pub after_utilization: f64,
}

/// Weighted-scoring router over a registry plus durable directory fallback.
pub struct AgentRouter {
    registry: Arc<AgentRegistry>,
    directory: Option<Arc<dyn AgentDirectory>>,
}

impl AgentRouter {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            directory: None,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn AgentDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Select the best available agent for the request.
    ///
    /// Fails with `CapacityError::NoSuitableAgent` when no candidate
    /// survives capability, tier, and degradation filtering.
    pub async fn route(&self, request: &RouteRequest) -> GantryResult<RouteDecision> {
        let mut candidates = self.registry.find_by_capabilities(
            &request.required_capabilities,
            true,
            true,
        );

        if candidates.is_empty() {
            candidates = self.directory_candidates(request).await?;
        }

        // Min-tier filter, then drop circuit-broken agents
        if let Some(min_tier) = request.min_performance_tier {
            candidates.retain(|a| a.performance_tier.rank() <= min_tier.rank());
        }
        candidates.retain(|a| a.performance_tier != PerformanceTier::Degraded);

        if candidates.is_empty() {
            return Err(CapacityError::NoSuitableAgent {
                required: request.required_capabilities.clone(),
            }
            .into());
        }

        let mut scored: Vec<(RegisteredAgent, f64)> = candidates
            .into_iter()
            .map(|agent| {
                let score = self.score(&agent, request);
                (agent, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (selected, score) = scored.remove(0);
        let alternatives: Vec<RegisteredAgent> =
            scored.into_iter().take(3).map(|(a, _)| a).collect();
        let reason = self.routing_reason(&selected, &request.required_capabilities, score);

        tracing::info!(
            agent = selected.name.as_str(),
            score,
            tier = %selected.performance_tier,
            "routed task"
        );

        Ok(RouteDecision {
            selected,
            score,
            alternatives,
            reason,
        })
    }

    async fn directory_candidates(
        &self,
        request: &RouteRequest,
    ) -> GantryResult<Vec<RegisteredAgent>> {
        let Some(directory) = &self.directory else {
            return Ok(Vec::new());
        };

        let mut candidates: Option<Vec<RegisteredAgent>> = None;
        for capability in &request.required_capabilities {
            let found = directory.find_by_capability(*capability).await?;
            candidates = Some(match candidates {
                None => found,
                Some(existing) => {
                    let ids: std::collections::HashSet<AgentId> =
                        found.iter().map(|a| a.id).collect();
                    existing.into_iter().filter(|a| ids.contains(&a.id)).collect()
                }
            });
        }
        Ok(candidates.unwrap_or_default())
    }

    fn score(&self, agent: &RegisteredAgent, request: &RouteRequest) -> f64 {
        let mut score = agent.performance_tier.score() * WEIGHT_PERFORMANCE_TIER;

        let capability_match = if request.required_capabilities.is_empty() {
            1.0
        } else {
            let matched = request
                .required_capabilities
                .iter()
                .filter(|c| agent.capabilities.contains(c))
                .count();
            matched as f64 / request.required_capabilities.len() as f64
        };
        score += capability_match * WEIGHT_CAPABILITY_MATCH;

        score += agent.load_level.score() * WEIGHT_LOAD_LEVEL;

        if agent.is_available() {
            score += WEIGHT_AVAILABILITY;
        }

        if request.preferred_agent_ids.contains(&agent.id) {
            score += PREFERRED_ID_BONUS;
        }
        if let Some(preferred_type) = &request.preferred_agent_type {
            let agent_type = agent
                .metadata
                .get("agent_type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(agent.agent_type.as_db_str());
            if agent_type == preferred_type {
                score += PREFERRED_TYPE_BONUS;
            }
        }

        score.min(1.0)
    }

    fn routing_reason(
        &self,
        agent: &RegisteredAgent,
        capabilities: &[AgentCapability],
        score: f64,
    ) -> String {
        let mut reasons = Vec::new();

        if matches!(
            agent.performance_tier,
            PerformanceTier::Elite | PerformanceTier::Advanced
        ) {
            reasons.push(format!("high performance tier ({})", agent.performance_tier));
        }

        let matched = capabilities
            .iter()
            .filter(|c| agent.capabilities.contains(c))
            .count();
        if matched == capabilities.len() {
            reasons.push("full capability match".to_string());
        } else {
            reasons.push(format!("matched {matched}/{} capabilities", capabilities.len()));
        }

        if matches!(agent.load_level, LoadLevel::Idle | LoadLevel::Optimal) {
            reasons.push("low current load".to_string());
        }

        format!("Selected for: {}. Score: {score:.2}", reasons.join(", "))
    }

    /// Apply the circuit breaker for one agent against its rolling record.
    ///
    /// After at least 5 tasks: below 30% success opens the breaker (tier ->
    /// degraded, removing the agent from routing); above 50% closes it,
    /// promoting back to trainee only. The breaker keeps no state of its
    /// own.
    pub fn apply_circuit_breaker(
        &self,
        agent_id: AgentId,
        performance: &AgentPerformance,
    ) -> Option<PerformanceTier> {
        if performance.total_tasks < CIRCUIT_BREAKER_MIN_TASKS {
            return None;
        }

        let agent = self.registry.get(agent_id)?;
        let success_rate = performance.success_rate();

        if success_rate < CIRCUIT_BREAKER_OPEN_BELOW
            && agent.performance_tier != PerformanceTier::Degraded
        {
            let mut updated = agent;
            updated.performance_tier = PerformanceTier::Degraded;
            self.registry.update(updated);
            tracing::warn!(
                agent_id = %agent_id,
                success_rate,
                "circuit breaker OPEN; agent degraded"
            );
            return Some(PerformanceTier::Degraded);
        }

        if success_rate > CIRCUIT_BREAKER_CLOSE_ABOVE
            && agent.performance_tier == PerformanceTier::Degraded
        {
            let mut updated = agent;
            updated.performance_tier = PerformanceTier::Trainee;
            self.registry.update(updated);
            tracing::info!(
                agent_id = %agent_id,
                success_rate,
                "circuit breaker CLOSED; agent promoted to trainee"
            );
            return Some(PerformanceTier::Trainee);
        }

        None
    }

    /// Identify overloaded agents and report rebalance intent with the mean
    /// utilization before and after (unchanged here; reassignment happens at
    /// the service layer).
    pub fn rebalance_workload(&self) -> RebalanceReport {
        let mut report = RebalanceReport::default();

        let stats_agents = self.registry.find_by_capabilities(&[], false, true);
        if stats_agents.is_empty() {
            return report;
        }

        report.before_utilization = stats_agents
            .iter()
            .map(|a| a.utilization())
            .sum::<f64>()
            / stats_agents.len() as f64;

        for agent in &stats_agents {
            if agent.current_tasks >= agent.max_concurrent_tasks {
                tracing::info!(
                    agent = agent.name.as_str(),
                    current_tasks = agent.current_tasks,
                    "agent overloaded; rebalance candidate"
                );
                report.agents_affected.push(agent.id);
            }
        }

        report.after_utilization = report.before_utilization;
        report
    }
}
