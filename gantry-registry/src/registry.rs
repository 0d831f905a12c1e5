//! In-memory agent registry with capability-based discovery.
//!
//! Primary index by id plus secondary indexes by capability and performance
//! tier, all guarded by one `RwLock` so index maintenance is atomic with the
//! record update. The durable record lives in an `AgentStore`; this registry
//! is the fast path and is rebuilt from storage on startup.

use chrono::{DateTime, Utc};
use gantry_core::{
    AgentCapability, AgentId, LoadLevel, PerformanceTier, RegisteredAgent, Timestamp,
};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

/// Default heartbeat TTL after which an agent is considered stale.
pub const DEFAULT_HEARTBEAT_TTL: Duration = Duration::from_secs(300);

/// Statistics cache TTL.
const STATS_CACHE_TTL: Duration = Duration::from_secs(5);

/// Aggregate statistics about the registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryStatistics {
    pub total_agents: usize,
    pub available_agents: usize,
    pub busy_agents: usize,
    pub degraded_agents: usize,
    pub agents_by_capability: HashMap<String, usize>,
    pub agents_by_tier: HashMap<String, usize>,
    pub agents_by_load: HashMap<String, usize>,
    pub last_updated: Option<Timestamp>,
}

#[derive(Default)]
struct RegistryInner {
    agents: HashMap<AgentId, RegisteredAgent>,
    by_capability: HashMap<AgentCapability, HashSet<AgentId>>,
    by_tier: HashMap<PerformanceTier, HashSet<AgentId>>,
    stats_cache: Option<(DateTime<Utc>, RegistryStatistics)>,
}

impl RegistryInner {
    fn index(&mut self, agent: &RegisteredAgent) {
        for capability in &agent.capabilities {
            self.by_capability
                .entry(*capability)
                .or_default()
                .insert(agent.id);
        }
        self.by_tier
            .entry(agent.performance_tier)
            .or_default()
            .insert(agent.id);
    }

    fn unindex(&mut self, agent: &RegisteredAgent) {
        for capability in &agent.capabilities {
            if let Some(ids) = self.by_capability.get_mut(capability) {
                ids.remove(&agent.id);
                if ids.is_empty() {
                    self.by_capability.remove(capability);
                }
            }
        }
        if let Some(ids) = self.by_tier.get_mut(&agent.performance_tier) {
            ids.remove(&agent.id);
            if ids.is_empty() {
                self.by_tier.remove(&agent.performance_tier);
            }
        }
    }

    fn invalidate_stats(&mut self) {
        self.stats_cache = None;
    }

    fn sort_for_routing(&self, agents: &mut Vec<RegisteredAgent>) {
        agents.sort_by(|a, b| {
            a.performance_tier
                .rank()
                .cmp(&b.performance_tier.rank())
                .then(
                    a.utilization()
                        .partial_cmp(&b.utilization())
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
    }
}

/// Thread-safe agent registry.
pub struct AgentRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register a new agent. Returns `false` if the id is already present.
    pub fn register(&self, agent: RegisteredAgent) -> bool {
        let mut inner = self.write();
        if inner.agents.contains_key(&agent.id) {
            return false;
        }
        inner.index(&agent);
        tracing::info!(
            agent = agent.name.as_str(),
            agent_id = %agent.id,
            capabilities = agent.capabilities.len(),
            "agent registered"
        );
        inner.agents.insert(agent.id, agent);
        inner.invalidate_stats();
        true
    }

    /// Remove an agent. Returns `false` if not found.
    pub fn deregister(&self, agent_id: AgentId) -> bool {
        let mut inner = self.write();
        let Some(agent) = inner.agents.remove(&agent_id) else {
            return false;
        };
        inner.unindex(&agent);
        inner.invalidate_stats();
        tracing::info!(agent = agent.name.as_str(), agent_id = %agent_id, "agent deregistered");
        true
    }

    /// Point lookup by id.
    pub fn get(&self, agent_id: AgentId) -> Option<RegisteredAgent> {
        self.read().agents.get(&agent_id).cloned()
    }

    /// Lookup by unique name.
    pub fn get_by_name(&self, name: &str) -> Option<RegisteredAgent> {
        self.read()
            .agents
            .values()
            .find(|a| a.name == name)
            .cloned()
    }

    /// Replace an existing agent's record, moving index entries as needed.
    /// Returns `false` if not found.
    pub fn update(&self, agent: RegisteredAgent) -> bool {
        let mut inner = self.write();
        let Some(old) = inner.agents.get(&agent.id).cloned() else {
            return false;
        };
        inner.unindex(&old);
        inner.index(&agent);
        inner.agents.insert(agent.id, agent);
        inner.invalidate_stats();
        true
    }

    /// Agents holding one capability, best tier first then least utilized.
    pub fn find_by_capability(
        &self,
        capability: AgentCapability,
        available_only: bool,
    ) -> Vec<RegisteredAgent> {
        let inner = self.read();
        let Some(ids) = inner.by_capability.get(&capability) else {
            return Vec::new();
        };
        let mut agents: Vec<RegisteredAgent> = ids
            .iter()
            .filter_map(|id| inner.agents.get(id))
            .filter(|a| !available_only || a.is_available())
            .cloned()
            .collect();
        inner.sort_for_routing(&mut agents);
        agents
    }

    /// Agents holding all (or, with `match_all = false`, any) of the
    /// required capabilities, sorted by match count, tier, then utilization.
    pub fn find_by_capabilities(
        &self,
        capabilities: &[AgentCapability],
        available_only: bool,
        match_all: bool,
    ) -> Vec<RegisteredAgent> {
        let inner = self.read();
        if capabilities.is_empty() {
            let mut agents: Vec<RegisteredAgent> = inner
                .agents
                .values()
                .filter(|a| !available_only || a.is_available())
                .cloned()
                .collect();
            inner.sort_for_routing(&mut agents);
            return agents;
        }

        let matching: HashSet<AgentId> = if match_all {
            let mut sets = capabilities
                .iter()
                .map(|c| inner.by_capability.get(c).cloned().unwrap_or_default());
            let Some(first) = sets.next() else {
                return Vec::new();
            };
            sets.fold(first, |acc, s| &acc & &s)
        } else {
            capabilities
                .iter()
                .flat_map(|c| inner.by_capability.get(c).cloned().unwrap_or_default())
                .collect()
        };

        let mut agents: Vec<RegisteredAgent> = matching
            .iter()
            .filter_map(|id| inner.agents.get(id))
            .filter(|a| !available_only || a.is_available())
            .cloned()
            .collect();

        agents.sort_by(|a, b| {
            let matched_a = capabilities
                .iter()
                .filter(|c| a.capabilities.contains(c))
                .count();
            let matched_b = capabilities
                .iter()
                .filter(|c| b.capabilities.contains(c))
                .count();
            matched_b
                .cmp(&matched_a)
                .then(a.performance_tier.rank().cmp(&b.performance_tier.rank()))
                .then(
                    a.utilization()
                        .partial_cmp(&b.utilization())
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        agents
    }

    /// All available agents, least utilized first.
    pub fn find_available(&self) -> Vec<RegisteredAgent> {
        let inner = self.read();
        let mut agents: Vec<RegisteredAgent> = inner
            .agents
            .values()
            .filter(|a| a.is_available())
            .cloned()
            .collect();
        agents.sort_by(|a, b| {
            a.utilization()
                .partial_cmp(&b.utilization())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        agents
    }

    /// Agents at a performance tier.
    pub fn find_by_tier(&self, tier: PerformanceTier, available_only: bool) -> Vec<RegisteredAgent> {
        let inner = self.read();
        let Some(ids) = inner.by_tier.get(&tier) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| inner.agents.get(id))
            .filter(|a| !available_only || a.is_available())
            .cloned()
            .collect()
    }

    /// Refresh an agent's heartbeat. Returns `false` if not found.
    pub fn update_heartbeat(&self, agent_id: AgentId) -> bool {
        let mut inner = self.write();
        match inner.agents.get_mut(&agent_id) {
            Some(agent) => {
                agent.last_heartbeat = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Increment the task count, recomputing the load level.
    pub fn increment_task_count(&self, agent_id: AgentId) -> bool {
        self.adjust_task_count(agent_id, 1)
    }

    /// Decrement the task count (floored at 0), recomputing the load level.
    pub fn decrement_task_count(&self, agent_id: AgentId) -> bool {
        self.adjust_task_count(agent_id, -1)
    }

    fn adjust_task_count(&self, agent_id: AgentId, delta: i32) -> bool {
        let mut inner = self.write();
        let Some(agent) = inner.agents.get_mut(&agent_id) else {
            return false;
        };
        agent.current_tasks = (agent.current_tasks + delta).max(0);
        agent.load_level = LoadLevel::from_utilization(agent.utilization());
        inner.invalidate_stats();
        true
    }

    /// Aggregate statistics, cached for 5 seconds.
    pub fn statistics(&self, force_refresh: bool) -> RegistryStatistics {
        {
            let inner = self.read();
            if !force_refresh {
                if let Some((cached_at, stats)) = &inner.stats_cache {
                    let age = Utc::now() - *cached_at;
                    if age.to_std().is_ok_and(|a| a < STATS_CACHE_TTL) {
                        return stats.clone();
                    }
                }
            }
        }

        let mut inner = self.write();
        let mut stats = RegistryStatistics {
            total_agents: inner.agents.len(),
            ..Default::default()
        };

        for agent in inner.agents.values() {
            if agent.is_available() {
                stats.available_agents += 1;
            } else {
                stats.busy_agents += 1;
            }
            if agent.performance_tier == PerformanceTier::Degraded {
                stats.degraded_agents += 1;
            }
            for capability in &agent.capabilities {
                *stats
                    .agents_by_capability
                    .entry(capability.as_db_str().to_string())
                    .or_default() += 1;
            }
            *stats
                .agents_by_tier
                .entry(agent.performance_tier.as_db_str().to_string())
                .or_default() += 1;
            *stats
                .agents_by_load
                .entry(agent.load_level.as_db_str().to_string())
                .or_default() += 1;
        }

        let now = Utc::now();
        stats.last_updated = Some(now);
        inner.stats_cache = Some((now, stats.clone()));
        stats
    }

    /// Agents whose heartbeat is older than `max_age`.
    pub fn stale_agents(&self, max_age: Duration) -> Vec<RegisteredAgent> {
        let now = Utc::now();
        self.read()
            .agents
            .values()
            .filter(|a| a.heartbeat_age_seconds(now) > max_age.as_secs_f64())
            .cloned()
            .collect()
    }

    /// Deregister agents with stale heartbeats. Idempotent; returns the
    /// number removed.
    pub fn cleanup_stale_agents(&self, max_age: Duration) -> usize {
        let stale = self.stale_agents(max_age);
        let mut removed = 0;
        for agent in stale {
            if self.deregister(agent.id) {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "swept stale agents from registry");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().agents.is_empty()
    }

    pub fn contains(&self, agent_id: AgentId) -> bool {
        self.read().agents.contains_key(&agent_id)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{AgentType, EntityIdType, TenantId};
    use std::collections::HashSet as StdHashSet;

    fn agent(name: &str, caps: &[AgentCapability]) -> RegisteredAgent {
        RegisteredAgent::new(
            TenantId::now_v7(),
            name,
            AgentType::Implementer,
            caps.iter().copied().collect::<StdHashSet<_>>(),
            5,
        )
        .expect("valid agent")
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = AgentRegistry::new();
        let a = agent("AGENT-IMPL-01", &[AgentCapability::CodeGeneration]);
        let id = a.id;
        assert!(registry.register(a.clone()));
        assert!(!registry.register(a)); // duplicate id

        assert!(registry.contains(id));
        assert_eq!(registry.get(id).map(|a| a.name), Some("AGENT-IMPL-01".into()));
        assert!(registry.get_by_name("AGENT-IMPL-01").is_some());
    }

    #[test]
    fn test_capability_index_maintenance() {
        let registry = AgentRegistry::new();
        let a = agent("AGENT-IMPL-01", &[AgentCapability::CodeGeneration]);
        let id = a.id;
        registry.register(a);

        assert_eq!(
            registry
                .find_by_capability(AgentCapability::CodeGeneration, true)
                .len(),
            1
        );

        registry.deregister(id);
        assert!(registry
            .find_by_capability(AgentCapability::CodeGeneration, true)
            .is_empty());
    }

    #[test]
    fn test_find_by_capabilities_match_all() {
        let registry = AgentRegistry::new();
        registry.register(agent(
            "AGENT-IMPL-01",
            &[AgentCapability::CodeGeneration, AgentCapability::TestGeneration],
        ));
        registry.register(agent("AGENT-IMPL-02", &[AgentCapability::CodeGeneration]));

        let both = registry.find_by_capabilities(
            &[AgentCapability::CodeGeneration, AgentCapability::TestGeneration],
            true,
            true,
        );
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].name, "AGENT-IMPL-01");

        let any = registry.find_by_capabilities(
            &[AgentCapability::CodeGeneration, AgentCapability::TestGeneration],
            true,
            false,
        );
        assert_eq!(any.len(), 2);
    }

    #[test]
    fn test_task_count_updates_load_level() {
        let registry = AgentRegistry::new();
        let a = agent("AGENT-IMPL-01", &[AgentCapability::CodeGeneration]);
        let id = a.id;
        registry.register(a);

        for _ in 0..5 {
            registry.increment_task_count(id);
        }
        let loaded = registry.get(id).unwrap();
        assert_eq!(loaded.current_tasks, 5);
        assert_eq!(loaded.load_level, LoadLevel::Critical);
        assert!(!loaded.is_available());

        registry.decrement_task_count(id);
        let loaded = registry.get(id).unwrap();
        assert_eq!(loaded.current_tasks, 4);
        assert_eq!(loaded.load_level, LoadLevel::Critical);
        assert!(loaded.is_available());
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        let registry = AgentRegistry::new();
        let a = agent("AGENT-IMPL-01", &[AgentCapability::CodeGeneration]);
        let id = a.id;
        registry.register(a);

        registry.decrement_task_count(id);
        assert_eq!(registry.get(id).unwrap().current_tasks, 0);
        assert_eq!(registry.get(id).unwrap().load_level, LoadLevel::Idle);
    }

    #[test]
    fn test_statistics() {
        let registry = AgentRegistry::new();
        registry.register(agent("AGENT-IMPL-01", &[AgentCapability::CodeGeneration]));
        let mut degraded = agent("AGENT-IMPL-02", &[AgentCapability::Refactoring]);
        degraded.performance_tier = PerformanceTier::Degraded;
        registry.register(degraded);

        let stats = registry.statistics(true);
        assert_eq!(stats.total_agents, 2);
        assert_eq!(stats.available_agents, 1);
        assert_eq!(stats.degraded_agents, 1);
        assert_eq!(stats.agents_by_capability.get("code_generation"), Some(&1));
        assert_eq!(stats.agents_by_tier.get("degraded"), Some(&1));
    }

    #[test]
    fn test_stale_cleanup() {
        let registry = AgentRegistry::new();
        let mut a = agent("AGENT-IMPL-01", &[AgentCapability::CodeGeneration]);
        a.last_heartbeat = Utc::now() - chrono::Duration::seconds(600);
        registry.register(a);
        registry.register(agent("AGENT-IMPL-02", &[AgentCapability::CodeGeneration]));

        let removed = registry.cleanup_stale_agents(DEFAULT_HEARTBEAT_TTL);
        assert_eq!(removed, 1);
        assert_eq!(registry.len(), 1);

        // Sweep is idempotent
        assert_eq!(registry.cleanup_stale_agents(DEFAULT_HEARTBEAT_TTL), 0);
    }

    #[test]
    fn test_update_moves_tier_index() {
        let registry = AgentRegistry::new();
        let mut a = agent("AGENT-IMPL-01", &[AgentCapability::CodeGeneration]);
        let id = a.id;
        registry.register(a.clone());

        a.performance_tier = PerformanceTier::Elite;
        assert!(registry.update(a));

        assert!(registry.find_by_tier(PerformanceTier::Competent, false).is_empty());
        let elites = registry.find_by_tier(PerformanceTier::Elite, false);
        assert_eq!(elites.len(), 1);
        assert_eq!(elites[0].id, id);
    }
}
