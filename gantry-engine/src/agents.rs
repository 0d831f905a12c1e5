//! Agent lifecycle service: registration, heartbeats, routing, and
//! performance accounting.
//!
//! Bridges the in-memory registry (fast path) and the durable agent store.
//! External agents register with endpoint metadata and receive an auth
//! token for the EAP `X-Agent-Token` header.

use crate::tenancy::RequestContext;
use gantry_core::{
    AgentCapability, AgentId, AgentPerformance, AgentType, GantryResult, NotFoundError,
    RegisteredAgent, TaskOutcome,
};
use gantry_registry::{AgentDirectory, AgentRegistry, AgentRouter, RouteDecision, RouteRequest};
use gantry_storage::AgentStore;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use async_trait::async_trait;

/// Registration result for an external agent.
#[derive(Debug, Clone)]
pub struct ExternalRegistration {
    pub agent_id: AgentId,
    pub auth_token: String,
}

/// Durable-store adapter for the router's per-capability fallback.
pub struct StoreDirectory {
    store: Arc<dyn AgentStore>,
    tenant_id: gantry_core::TenantId,
}

#[async_trait]
impl AgentDirectory for StoreDirectory {
    async fn find_by_capability(
        &self,
        capability: AgentCapability,
    ) -> GantryResult<Vec<RegisteredAgent>> {
        self.store.find_by_capability(capability, self.tenant_id).await
    }
}

/// Agent lifecycle and routing service.
pub struct AgentService {
    registry: Arc<AgentRegistry>,
    router: AgentRouter,
    store: Arc<dyn AgentStore>,
    /// Rolling per-agent performance records driving the circuit breaker
    performance: Mutex<HashMap<AgentId, AgentPerformance>>,
}

impl AgentService {
    pub fn new(registry: Arc<AgentRegistry>, store: Arc<dyn AgentStore>) -> Self {
        let router = AgentRouter::new(Arc::clone(&registry));
        Self {
            registry,
            router,
            store,
            performance: Mutex::new(HashMap::new()),
        }
    }

    /// Register an internal agent: validates, persists, and indexes.
    pub async fn register_agent(
        &self,
        ctx: &RequestContext,
        name: &str,
        agent_type: AgentType,
        capabilities: HashSet<AgentCapability>,
        max_concurrent_tasks: i32,
        metadata: BTreeMap<String, Value>,
    ) -> GantryResult<RegisteredAgent> {
        let tenant_id = ctx.require_tenant("register_agent")?;
        let agent = RegisteredAgent::new(
            tenant_id,
            name,
            agent_type,
            capabilities,
            max_concurrent_tasks,
        )?
        .with_metadata(metadata);

        self.store.register(&agent).await?;
        self.registry.register(agent.clone());
        Ok(agent)
    }

    /// Register an external agent, minting its EAP auth token.
    pub async fn register_external_agent(
        &self,
        ctx: &RequestContext,
        name: &str,
        agent_type: AgentType,
        capabilities: HashSet<AgentCapability>,
        endpoint_url: &str,
        max_concurrent_tasks: i32,
    ) -> GantryResult<ExternalRegistration> {
        let auth_token = format!("eap_{}", Uuid::now_v7().simple());

        let mut metadata = BTreeMap::new();
        metadata.insert("is_external".to_string(), Value::Bool(true));
        metadata.insert("endpoint_url".to_string(), Value::from(endpoint_url));
        metadata.insert("auth_token".to_string(), Value::from(auth_token.clone()));
        metadata.insert(
            "agent_type".to_string(),
            Value::from(agent_type.as_db_str()),
        );

        let agent = self
            .register_agent(
                ctx,
                name,
                agent_type,
                capabilities,
                max_concurrent_tasks,
                metadata,
            )
            .await?;

        Ok(ExternalRegistration {
            agent_id: agent.id,
            auth_token,
        })
    }

    /// Deregister from both the registry and the durable store.
    pub async fn deregister_agent(
        &self,
        ctx: &RequestContext,
        agent_id: AgentId,
    ) -> GantryResult<bool> {
        let tenant_id = ctx.require_tenant("deregister_agent")?;
        let removed = self.store.deregister(agent_id, tenant_id).await?;
        self.registry.deregister(agent_id);
        if let Ok(mut performance) = self.performance.lock() {
            performance.remove(&agent_id);
        }
        Ok(removed)
    }

    /// Refresh heartbeats in the registry and the durable record.
    pub async fn heartbeat(&self, ctx: &RequestContext, agent_id: AgentId) -> GantryResult<bool> {
        let tenant_id = ctx.require_tenant("heartbeat")?;
        let local = self.registry.update_heartbeat(agent_id);
        let durable = self.store.heartbeat(agent_id, tenant_id).await?;
        Ok(local || durable)
    }

    /// Route a task, falling back to the durable store when the registry
    /// has no candidates.
    pub async fn route_task(
        &self,
        ctx: &RequestContext,
        request: &RouteRequest,
    ) -> GantryResult<RouteDecision> {
        let tenant_id = ctx.require_tenant("route_task")?;
        // The router holds no tenant state; scope the fallback per call.
        let scoped = AgentRouter::new(Arc::clone(&self.registry)).with_directory(Arc::new(
            StoreDirectory {
                store: Arc::clone(&self.store),
                tenant_id,
            },
        ));
        scoped.route(request).await
    }

    /// Record a task outcome: updates the rolling performance record,
    /// applies the circuit breaker, and syncs tier changes to the durable
    /// store.
    pub async fn record_task_outcome(
        &self,
        ctx: &RequestContext,
        agent_id: AgentId,
        outcome: &TaskOutcome,
    ) -> GantryResult<()> {
        let tenant_id = ctx.require_tenant("record_task_outcome")?;

        let snapshot = {
            let mut table = self
                .performance
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let record = table.entry(agent_id).or_default();
            record.record(outcome);
            record.clone()
        };

        if let Some(new_tier) = self.router.apply_circuit_breaker(agent_id, &snapshot) {
            if let Some(mut agent) = self.store.get(agent_id, tenant_id).await? {
                agent.performance_tier = new_tier;
                self.store.update(&agent).await?;
            }
        }
        Ok(())
    }

    /// Current rolling performance record for an agent.
    pub fn performance_of(&self, agent_id: AgentId) -> Option<AgentPerformance> {
        self.performance
            .lock()
            .ok()
            .and_then(|table| table.get(&agent_id).cloned())
    }

    /// Performance summary for monitoring.
    pub async fn agent_summary(
        &self,
        ctx: &RequestContext,
        agent_id: AgentId,
    ) -> GantryResult<Value> {
        let tenant_id = ctx.require_tenant("agent_summary")?;
        let agent = self
            .store
            .get(agent_id, tenant_id)
            .await?
            .ok_or(NotFoundError::Agent(agent_id))?;
        let performance = self.performance_of(agent_id).unwrap_or_default();

        Ok(serde_json::json!({
            "agent_id": agent.id.to_string(),
            "agent_name": agent.name,
            "agent_type": agent.agent_type.as_db_str(),
            "performance_tier": agent.performance_tier.as_db_str(),
            "load_level": agent.load_level.as_db_str(),
            "success_rate": performance.success_rate(),
            "total_tasks": performance.total_tasks,
            "current_tasks": agent.current_tasks,
            "max_concurrent_tasks": agent.max_concurrent_tasks,
            "utilization": agent.utilization(),
        }))
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &AgentRouter {
        &self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{PerformanceTier, Tenant};
    use gantry_storage::{MemoryStore, TenantStore};

    async fn service() -> (AgentService, RequestContext) {
        let store = Arc::new(MemoryStore::new());
        let tenant = Tenant::new("Acme Robotics", "acme-robots").expect("tenant");
        let tenant_id = tenant.id;
        TenantStore::insert(store.as_ref(), &tenant)
            .await
            .expect("insert tenant");

        let registry = Arc::new(AgentRegistry::new());
        let service = AgentService::new(registry, store as Arc<dyn AgentStore>);
        (service, RequestContext::for_tenant(tenant_id))
    }

    #[tokio::test]
    async fn test_register_and_route() {
        let (service, ctx) = service().await;
        let agent = service
            .register_agent(
                &ctx,
                "AGENT-IMPL-01",
                AgentType::Implementer,
                [AgentCapability::CodeGeneration].into_iter().collect(),
                5,
                BTreeMap::new(),
            )
            .await
            .expect("register");

        let decision = service
            .route_task(
                &ctx,
                &RouteRequest::for_capabilities(&[AgentCapability::CodeGeneration]),
            )
            .await
            .expect("route");
        assert_eq!(decision.selected.id, agent.id);
    }

    #[tokio::test]
    async fn test_external_registration_mints_token() {
        let (service, ctx) = service().await;
        let registration = service
            .register_external_agent(
                &ctx,
                "AGENT-EXT-01",
                AgentType::Implementer,
                [AgentCapability::CodeGeneration].into_iter().collect(),
                "http://agents.example.com/ext-01",
                5,
            )
            .await
            .expect("register");
        assert!(registration.auth_token.starts_with("eap_"));

        let agent = service
            .registry()
            .get(registration.agent_id)
            .expect("indexed");
        assert!(agent.is_external());
        assert_eq!(
            agent.endpoint_url(),
            Some("http://agents.example.com/ext-01")
        );
        assert_eq!(agent.auth_token(), Some(registration.auth_token.as_str()));
    }

    #[tokio::test]
    async fn test_directory_fallback_when_registry_cold() {
        let (service, ctx) = service().await;
        let agent = service
            .register_agent(
                &ctx,
                "AGENT-IMPL-02",
                AgentType::Implementer,
                [AgentCapability::Refactoring].into_iter().collect(),
                5,
                BTreeMap::new(),
            )
            .await
            .expect("register");

        // Simulate a cold registry (e.g. after restart)
        service.registry().deregister(agent.id);

        let decision = service
            .route_task(
                &ctx,
                &RouteRequest::for_capabilities(&[AgentCapability::Refactoring]),
            )
            .await
            .expect("route via durable store");
        assert_eq!(decision.selected.id, agent.id);
    }

    #[tokio::test]
    async fn test_outcome_recording_trips_circuit_breaker() {
        let (service, ctx) = service().await;
        let agent = service
            .register_agent(
                &ctx,
                "AGENT-FLAKY",
                AgentType::Implementer,
                [AgentCapability::CodeGeneration].into_iter().collect(),
                5,
                BTreeMap::new(),
            )
            .await
            .expect("register");

        for _ in 0..6 {
            service
                .record_task_outcome(&ctx, agent.id, &TaskOutcome::default())
                .await
                .expect("record");
        }

        let indexed = service.registry().get(agent.id).expect("indexed");
        assert_eq!(indexed.performance_tier, PerformanceTier::Degraded);

        // Durable record follows
        let stored = service
            .store
            .get(agent.id, ctx.tenant_id().unwrap())
            .await
            .expect("get")
            .expect("present");
        assert_eq!(stored.performance_tier, PerformanceTier::Degraded);
    }
}
