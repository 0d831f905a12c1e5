//! The kernel: explicit dependency-injection root.
//!
//! Owns the storage, lease store, lock manager, registry, event bus, and
//! services; constructed once at program start and passed down. There are
//! no global singletons anywhere in the engine.

use crate::agents::AgentService;
use crate::contexts::ContextService;
use crate::events::EventBus;
use crate::executor::SessionExecutor;
use crate::fine_tuning::FineTuningService;
use crate::ports::{ExecutionPort, ExternalAgentPort};
use crate::session_service::SessionService;
use crate::tasks::TaskService;
use gantry_core::OrchestratorConfig;
use gantry_locks::{LeaseStore, LockManager, MemoryLeaseStore};
use gantry_registry::AgentRegistry;
use gantry_storage::{
    AgentStore, ContextStore, FineTuningStore, MemoryStore, SessionStore, TaskStore,
    TenantStore,
};
use std::sync::Arc;

/// Aggregate of every long-lived collaborator in the engine.
pub struct Kernel {
    pub config: OrchestratorConfig,
    pub locks: Arc<LockManager>,
    pub registry: Arc<AgentRegistry>,
    pub events: EventBus,
    pub sessions: Arc<SessionService>,
    pub agents: Arc<AgentService>,
    pub contexts: ContextService,
    pub tasks: TaskService,
    pub executor: SessionExecutor,
    pub fine_tuning: FineTuningService,
    pub tenant_store: Arc<dyn TenantStore>,
    pub agent_store: Arc<dyn AgentStore>,
    pub session_store: Arc<dyn SessionStore>,
}

impl Kernel {
    /// Wire a kernel over in-memory storage and lease store. Callers supply
    /// the two execution ports (internal workbench, external EAP).
    pub fn in_memory(
        config: OrchestratorConfig,
        internal: Arc<dyn ExecutionPort>,
        external: Arc<dyn ExternalAgentPort>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let lease_store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        Self::wire(config, store, lease_store, internal, external)
    }

    /// Wire a kernel over a shared store implementing every port.
    pub fn wire(
        config: OrchestratorConfig,
        store: Arc<MemoryStore>,
        lease_store: Arc<dyn LeaseStore>,
        internal: Arc<dyn ExecutionPort>,
        external: Arc<dyn ExternalAgentPort>,
    ) -> Self {
        let locks = Arc::new(LockManager::new(lease_store));
        let registry = Arc::new(AgentRegistry::new());
        let events = EventBus::default();

        let session_store: Arc<dyn SessionStore> = Arc::clone(&store) as Arc<dyn SessionStore>;
        let tenant_store: Arc<dyn TenantStore> = Arc::clone(&store) as Arc<dyn TenantStore>;
        let agent_store: Arc<dyn AgentStore> = Arc::clone(&store) as Arc<dyn AgentStore>;
        let job_store: Arc<dyn FineTuningStore> =
            Arc::clone(&store) as Arc<dyn FineTuningStore>;

        let sessions = Arc::new(SessionService::new(
            Arc::clone(&session_store),
            Arc::clone(&tenant_store),
            Arc::clone(&locks),
            events.clone(),
            config.clone(),
        ));

        let agents = Arc::new(AgentService::new(
            Arc::clone(&registry),
            Arc::clone(&agent_store),
        ));

        let context_store: Arc<dyn ContextStore> = Arc::clone(&store) as Arc<dyn ContextStore>;
        let contexts = ContextService::new(context_store);

        let task_store: Arc<dyn TaskStore> = Arc::clone(&store) as Arc<dyn TaskStore>;
        let tasks = TaskService::new(task_store);

        let executor = SessionExecutor::new(
            Arc::clone(&sessions),
            Arc::clone(&agent_store),
            Arc::clone(&registry),
            external,
            internal,
        );

        let fine_tuning =
            FineTuningService::new(job_store, Arc::clone(&locks), config.clone());

        Self {
            config,
            locks,
            registry,
            events,
            sessions,
            agents,
            contexts,
            tasks,
            executor,
            fine_tuning,
            tenant_store,
            agent_store,
            session_store,
        }
    }
}
