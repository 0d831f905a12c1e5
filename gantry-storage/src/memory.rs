//! In-memory storage implementing every repository port.
//!
//! The reference implementation for tests and single-process deployments.
//! It enforces the same invariants the relational schema enforces with
//! triggers: strict `version + 1` on session updates, soft-delete
//! visibility, unique gapless checkpoint sequences, and parent `child_ids`
//! maintenance at the write boundary.

use crate::ports::{
    AgentStore, ContextStore, FineTuningStore, QueryOptions, SessionFilter, SessionStats,
    SessionStore, TaskStore, TenantStore,
};
use async_trait::async_trait;
use chrono::Utc;
use gantry_context::{ExecutionContext, TEMPORARY_TTL_SECONDS};
use gantry_core::{
    AgentCapability, AgentId, Checkpoint, ConcurrencyError, ContextId, ContextScope,
    FineTuningJob, GantryResult, JobId, NotFoundError, RegisteredAgent, Session, SessionId,
    StorageError, Task, TaskId, Tenant, TenantId,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Default)]
struct Tables {
    tenants: HashMap<TenantId, Tenant>,
    sessions: HashMap<SessionId, Session>,
    checkpoints: HashMap<SessionId, Vec<Checkpoint>>,
    agents: HashMap<AgentId, RegisteredAgent>,
    tasks: HashMap<TaskId, Task>,
    contexts: HashMap<ContextId, ExecutionContext>,
    jobs: HashMap<JobId, FineTuningJob>,
}

/// In-memory store backing every repository port.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> GantryResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> GantryResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

fn visible<'a>(session: &'a Session, tenant_id: TenantId) -> Option<&'a Session> {
    (session.tenant_id == tenant_id && session.deleted_at.is_none()).then_some(session)
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: &Session) -> GantryResult<()> {
        let mut tables = self.write()?;
        if tables.sessions.contains_key(&session.id) {
            return Err(StorageError::InsertFailed {
                entity: "session".into(),
                reason: format!("duplicate id {}", session.id),
            }
            .into());
        }

        // Maintain the parent's denormalized child list at the write
        // boundary, the same contract the relational trigger provides.
        if let Some(parent_id) = session.parent_id {
            let Some(parent) = tables.sessions.get_mut(&parent_id) else {
                return Err(NotFoundError::Session(parent_id).into());
            };
            if !parent.child_ids.contains(&session.id) {
                parent.child_ids.push(session.id);
            }
        }

        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: SessionId, tenant_id: TenantId) -> GantryResult<Option<Session>> {
        let tables = self.read()?;
        Ok(tables
            .sessions
            .get(&id)
            .and_then(|s| visible(s, tenant_id))
            .cloned())
    }

    async fn update(&self, session: &Session) -> GantryResult<Session> {
        let mut tables = self.write()?;
        let Some(stored) = tables.sessions.get_mut(&session.id) else {
            return Err(NotFoundError::Session(session.id).into());
        };

        if stored.version != session.version {
            return Err(ConcurrencyError::OptimisticLock {
                entity: "session".into(),
                expected: session.version,
                actual: stored.version,
            }
            .into());
        }

        let mut committed = session.clone();
        committed.version = session.version + 1;
        committed.updated_at = Utc::now();
        // child_ids stays store-maintained
        committed.child_ids = stored.child_ids.clone();
        *stored = committed.clone();
        Ok(committed)
    }

    async fn soft_delete(&self, id: SessionId, tenant_id: TenantId) -> GantryResult<()> {
        let mut tables = self.write()?;
        let parent_id = {
            let Some(session) = tables.sessions.get_mut(&id) else {
                return Err(NotFoundError::Session(id).into());
            };
            if session.tenant_id != tenant_id {
                return Err(NotFoundError::Session(id).into());
            }
            session.deleted_at = Some(Utc::now());
            session.parent_id
        };

        if let Some(parent_id) = parent_id {
            if let Some(parent) = tables.sessions.get_mut(&parent_id) {
                parent.child_ids.retain(|child| *child != id);
            }
        }
        Ok(())
    }

    async fn count_active_by_tenant(&self, tenant_id: TenantId) -> GantryResult<usize> {
        let tables = self.read()?;
        Ok(tables
            .sessions
            .values()
            .filter_map(|s| visible(s, tenant_id))
            .filter(|s| s.status.is_active())
            .count())
    }

    async fn find(
        &self,
        tenant_id: TenantId,
        filter: &SessionFilter,
        options: QueryOptions,
    ) -> GantryResult<Vec<Session>> {
        let tables = self.read()?;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter_map(|s| visible(s, tenant_id))
            .filter(|s| filter.status.is_none_or(|status| s.status == status))
            .filter(|s| filter.session_type.is_none_or(|t| s.session_type == t))
            .filter(|s| filter.priority.is_none_or(|p| s.priority == p))
            .filter(|s| {
                filter
                    .created_by
                    .as_deref()
                    .is_none_or(|c| s.created_by.as_deref() == Some(c))
            })
            .filter(|s| filter.tags.iter().all(|tag| s.tags.contains(tag)))
            .cloned()
            .collect();

        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions
            .into_iter()
            .skip(options.offset)
            .take(options.limit)
            .collect())
    }

    async fn find_active(&self, tenant_id: TenantId) -> GantryResult<Vec<Session>> {
        let tables = self.read()?;
        Ok(tables
            .sessions
            .values()
            .filter_map(|s| visible(s, tenant_id))
            .filter(|s| s.status.is_active())
            .cloned()
            .collect())
    }

    async fn children(
        &self,
        parent_id: SessionId,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<Session>> {
        let tables = self.read()?;
        let Some(parent) = tables
            .sessions
            .get(&parent_id)
            .and_then(|s| visible(s, tenant_id))
        else {
            return Ok(Vec::new());
        };
        Ok(parent
            .child_ids
            .iter()
            .filter_map(|id| tables.sessions.get(id))
            .filter_map(|s| visible(s, tenant_id))
            .cloned()
            .collect())
    }

    async fn add_checkpoint(
        &self,
        session_id: SessionId,
        tenant_id: TenantId,
        data: Value,
        metadata: BTreeMap<String, Value>,
    ) -> GantryResult<Checkpoint> {
        let mut tables = self.write()?;
        if tables
            .sessions
            .get(&session_id)
            .and_then(|s| visible(s, tenant_id))
            .is_none()
        {
            return Err(NotFoundError::Session(session_id).into());
        }

        let checkpoints = tables.checkpoints.entry(session_id).or_default();
        let sequence = checkpoints.last().map(|c| c.sequence + 1).unwrap_or(1);
        let checkpoint = Checkpoint {
            session_id,
            sequence,
            data,
            created_at: Utc::now(),
            metadata,
        };
        checkpoints.push(checkpoint.clone());

        if let Some(session) = tables.sessions.get_mut(&session_id) {
            session.metrics.record_checkpoint(checkpoint.created_at);
        }
        Ok(checkpoint)
    }

    async fn checkpoints(
        &self,
        session_id: SessionId,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<Checkpoint>> {
        let tables = self.read()?;
        if tables
            .sessions
            .get(&session_id)
            .and_then(|s| visible(s, tenant_id))
            .is_none()
        {
            return Ok(Vec::new());
        }
        Ok(tables
            .checkpoints
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn stats(&self, tenant_id: TenantId) -> GantryResult<SessionStats> {
        let tables = self.read()?;
        let mut stats = SessionStats::default();
        for session in tables
            .sessions
            .values()
            .filter_map(|s| visible(s, tenant_id))
        {
            stats.total += 1;
            *stats
                .by_status
                .entry(session.status.as_db_str().to_string())
                .or_default() += 1;
            *stats
                .by_type
                .entry(session.session_type.as_db_str().to_string())
                .or_default() += 1;
        }
        Ok(stats)
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn register(&self, agent: &RegisteredAgent) -> GantryResult<()> {
        let mut tables = self.write()?;
        if tables
            .agents
            .values()
            .any(|a| a.tenant_id == agent.tenant_id && a.name == agent.name)
        {
            return Err(StorageError::InsertFailed {
                entity: "agent".into(),
                reason: format!("duplicate name {}", agent.name),
            }
            .into());
        }
        tables.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get(&self, id: AgentId, tenant_id: TenantId) -> GantryResult<Option<RegisteredAgent>> {
        let tables = self.read()?;
        Ok(tables
            .agents
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_by_name(
        &self,
        name: &str,
        tenant_id: TenantId,
    ) -> GantryResult<Option<RegisteredAgent>> {
        let tables = self.read()?;
        Ok(tables
            .agents
            .values()
            .find(|a| a.tenant_id == tenant_id && a.name == name)
            .cloned())
    }

    async fn update(&self, agent: &RegisteredAgent) -> GantryResult<()> {
        let mut tables = self.write()?;
        if !tables.agents.contains_key(&agent.id) {
            return Err(NotFoundError::Agent(agent.id).into());
        }
        tables.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn deregister(&self, id: AgentId, tenant_id: TenantId) -> GantryResult<bool> {
        let mut tables = self.write()?;
        match tables.agents.get(&id) {
            Some(agent) if agent.tenant_id == tenant_id => {
                tables.agents.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_capability(
        &self,
        capability: AgentCapability,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<RegisteredAgent>> {
        let tables = self.read()?;
        Ok(tables
            .agents
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .filter(|a| a.capabilities.contains(&capability))
            .filter(|a| a.is_available())
            .cloned()
            .collect())
    }

    async fn find_available(&self, tenant_id: TenantId) -> GantryResult<Vec<RegisteredAgent>> {
        let tables = self.read()?;
        Ok(tables
            .agents
            .values()
            .filter(|a| a.tenant_id == tenant_id && a.is_available())
            .cloned()
            .collect())
    }

    async fn heartbeat(&self, id: AgentId, tenant_id: TenantId) -> GantryResult<bool> {
        let mut tables = self.write()?;
        match tables.agents.get_mut(&id) {
            Some(agent) if agent.tenant_id == tenant_id => {
                agent.last_heartbeat = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn insert(&self, tenant: &Tenant) -> GantryResult<()> {
        let mut tables = self.write()?;
        if tables.tenants.values().any(|t| t.slug == tenant.slug) {
            return Err(StorageError::InsertFailed {
                entity: "tenant".into(),
                reason: format!("duplicate slug {}", tenant.slug),
            }
            .into());
        }
        tables.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn get(&self, id: TenantId) -> GantryResult<Option<Tenant>> {
        Ok(self.read()?.tenants.get(&id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> GantryResult<Option<Tenant>> {
        Ok(self
            .read()?
            .tenants
            .values()
            .find(|t| t.slug == slug)
            .cloned())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert(&self, task: &Task) -> GantryResult<()> {
        let mut tables = self.write()?;
        tables.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId, tenant_id: TenantId) -> GantryResult<Option<Task>> {
        let tables = self.read()?;
        Ok(tables
            .tasks
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn update(&self, task: &Task) -> GantryResult<()> {
        let mut tables = self.write()?;
        if !tables.tasks.contains_key(&task.id) {
            return Err(NotFoundError::Task(task.id).into());
        }
        tables.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn list_by_session(
        &self,
        session_id: SessionId,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<Task>> {
        let tables = self.read()?;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.session_id == session_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}

#[async_trait]
impl ContextStore for MemoryStore {
    async fn insert(&self, context: &ExecutionContext) -> GantryResult<()> {
        let mut tables = self.write()?;
        tables.contexts.insert(context.id, context.clone());
        Ok(())
    }

    async fn get(
        &self,
        id: ContextId,
        tenant_id: TenantId,
    ) -> GantryResult<Option<ExecutionContext>> {
        let tables = self.read()?;
        Ok(tables
            .contexts
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn update(
        &self,
        id: ContextId,
        tenant_id: TenantId,
        updates: BTreeMap<String, Value>,
        expected_version: i64,
    ) -> GantryResult<ExecutionContext> {
        let mut tables = self.write()?;
        let Some(stored) = tables
            .contexts
            .get_mut(&id)
            .filter(|c| c.tenant_id == tenant_id)
        else {
            return Err(NotFoundError::Context(id).into());
        };

        if stored.version != expected_version {
            return Err(ConcurrencyError::ContextConflict {
                context_id: id,
                expected: expected_version,
                actual: stored.version,
                conflicting_keys: updates.keys().cloned().collect(),
            }
            .into());
        }

        for (key, value) in updates {
            stored.set(&key, value, None);
        }
        Ok(stored.clone())
    }

    async fn delete(&self, id: ContextId, tenant_id: TenantId) -> GantryResult<bool> {
        let mut tables = self.write()?;
        match tables.contexts.get(&id) {
            Some(context) if context.tenant_id == tenant_id => {
                tables.contexts.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_scope(
        &self,
        scope: ContextScope,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<ExecutionContext>> {
        let tables = self.read()?;
        Ok(tables
            .contexts
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.scope == scope)
            .cloned()
            .collect())
    }

    async fn find_by_session(
        &self,
        session_id: SessionId,
        tenant_id: TenantId,
    ) -> GantryResult<Vec<ExecutionContext>> {
        let tables = self.read()?;
        Ok(tables
            .contexts
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.session_id == Some(session_id))
            .cloned()
            .collect())
    }

    async fn cleanup_expired_temporary(&self, tenant_id: TenantId) -> GantryResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::seconds(TEMPORARY_TTL_SECONDS);
        let mut tables = self.write()?;
        let before = tables.contexts.len();
        tables.contexts.retain(|_, c| {
            !(c.tenant_id == tenant_id
                && c.scope == ContextScope::Temporary
                && c.updated_at < cutoff)
        });
        Ok(before - tables.contexts.len())
    }
}

#[async_trait]
impl FineTuningStore for MemoryStore {
    async fn insert(&self, job: &FineTuningJob) -> GantryResult<()> {
        let mut tables = self.write()?;
        tables.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId, tenant_id: TenantId) -> GantryResult<Option<FineTuningJob>> {
        let tables = self.read()?;
        Ok(tables
            .jobs
            .get(&id)
            .filter(|j| j.tenant_id == tenant_id)
            .cloned())
    }

    async fn update(&self, job: &FineTuningJob) -> GantryResult<()> {
        let mut tables = self.write()?;
        if !tables.jobs.contains_key(&job.id) {
            return Err(NotFoundError::Entity {
                entity: "fine_tuning_job".into(),
                id: job.id.to_string(),
            }
            .into());
        }
        tables.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn list_by_tenant(&self, tenant_id: TenantId) -> GantryResult<Vec<FineTuningJob>> {
        let tables = self.read()?;
        Ok(tables
            .jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{EntityIdType, GantryError, SessionStatus};
    use serde_json::json;

    fn session(tenant: TenantId) -> Session {
        Session::new(tenant, "IMPL authentication", "Implement OAuth2").expect("session")
    }

    #[tokio::test]
    async fn test_session_insert_get_roundtrip() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let s = session(tenant);
        SessionStore::insert(&store, &s).await.expect("insert");

        let loaded = SessionStore::get(&store, s.id, tenant)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.title, s.title);

        // Wrong tenant sees nothing
        let other = SessionStore::get(&store, s.id, TenantId::now_v7())
            .await
            .expect("get");
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_session_update_enforces_strict_versioning() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let s = session(tenant);
        SessionStore::insert(&store, &s).await.expect("insert");

        let committed = SessionStore::update(&store, &s).await.expect("update");
        assert_eq!(committed.version, s.version + 1);

        // A racer still holding the old version loses
        let err = SessionStore::update(&store, &s).await.unwrap_err();
        assert!(matches!(
            err,
            GantryError::Concurrency(ConcurrencyError::OptimisticLock { .. })
        ));
    }

    #[tokio::test]
    async fn test_parent_child_ids_maintained() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let parent = session(tenant);
        SessionStore::insert(&store, &parent).await.expect("insert");

        let child = session(tenant).with_parent(parent.id);
        SessionStore::insert(&store, &child).await.expect("insert");

        let loaded = SessionStore::get(&store, parent.id, tenant)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.child_ids, vec![child.id]);

        SessionStore::soft_delete(&store, child.id, tenant)
            .await
            .expect("delete");
        let loaded = SessionStore::get(&store, parent.id, tenant)
            .await
            .expect("get")
            .expect("present");
        assert!(loaded.child_ids.is_empty());
    }

    #[tokio::test]
    async fn test_insert_with_missing_parent_fails() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let orphan = session(tenant).with_parent(SessionId::now_v7());
        let err = SessionStore::insert(&store, &orphan).await.unwrap_err();
        assert!(matches!(err, GantryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_reads() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let s = session(tenant);
        SessionStore::insert(&store, &s).await.expect("insert");
        SessionStore::soft_delete(&store, s.id, tenant)
            .await
            .expect("delete");

        assert!(SessionStore::get(&store, s.id, tenant)
            .await
            .expect("get")
            .is_none());
        assert_eq!(
            SessionStore::stats(&store, tenant).await.expect("stats").total,
            0
        );
    }

    #[tokio::test]
    async fn test_checkpoint_sequences_are_gapless() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let s = session(tenant);
        SessionStore::insert(&store, &s).await.expect("insert");

        for i in 0..3 {
            let checkpoint = SessionStore::add_checkpoint(
                &store,
                s.id,
                tenant,
                json!({"step": i}),
                BTreeMap::new(),
            )
            .await
            .expect("checkpoint");
            assert_eq!(checkpoint.sequence, i + 1);
        }

        let all = SessionStore::checkpoints(&store, s.id, tenant)
            .await
            .expect("checkpoints");
        assert_eq!(
            all.iter().map(|c| c.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_count_active_by_tenant() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();

        let mut running = session(tenant);
        running.start_execution().expect("start");
        SessionStore::insert(&store, &running).await.expect("insert");

        let pending = session(tenant);
        SessionStore::insert(&store, &pending).await.expect("insert");

        let mut done = session(tenant);
        done.start_execution().expect("start");
        done.complete_with_result(json!({})).expect("complete");
        SessionStore::insert(&store, &done).await.expect("insert");

        // running is active; pending and completed are not
        assert_eq!(
            SessionStore::count_active_by_tenant(&store, tenant)
                .await
                .expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn test_find_with_filters() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let mut a = session(tenant);
        a.tags = vec!["auth".to_string()];
        SessionStore::insert(&store, &a).await.expect("insert");
        SessionStore::insert(&store, &session(tenant))
            .await
            .expect("insert");

        let filter = SessionFilter {
            tags: vec!["auth".to_string()],
            ..Default::default()
        };
        let found = SessionStore::find(&store, tenant, &filter, QueryOptions::default())
            .await
            .expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);

        let filter = SessionFilter {
            status: Some(SessionStatus::Pending),
            ..Default::default()
        };
        let found = SessionStore::find(&store, tenant, &filter, QueryOptions::default())
            .await
            .expect("find");
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_agent_name_uniqueness_per_tenant() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let agent = RegisteredAgent::new(
            tenant,
            "AGENT-IMPL-01",
            gantry_core::AgentType::Implementer,
            [AgentCapability::CodeGeneration].into_iter().collect(),
            5,
        )
        .expect("agent");
        AgentStore::register(&store, &agent).await.expect("register");

        let dup = RegisteredAgent::new(
            tenant,
            "AGENT-IMPL-01",
            gantry_core::AgentType::Implementer,
            [AgentCapability::CodeGeneration].into_iter().collect(),
            5,
        )
        .expect("agent");
        assert!(AgentStore::register(&store, &dup).await.is_err());
    }

    #[tokio::test]
    async fn test_context_update_conflict() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let context = ExecutionContext::new(tenant, ContextScope::Global, None, None)
            .expect("context");
        ContextStore::insert(&store, &context).await.expect("insert");

        let mut updates = BTreeMap::new();
        updates.insert("key".to_string(), json!("value"));
        let updated = ContextStore::update(&store, context.id, tenant, updates.clone(), 1)
            .await
            .expect("update");
        assert_eq!(updated.version, 2);

        // Stale expected version conflicts and reports the keys
        let err = ContextStore::update(&store, context.id, tenant, updates, 1)
            .await
            .unwrap_err();
        match err {
            GantryError::Concurrency(ConcurrencyError::ContextConflict {
                expected,
                actual,
                conflicting_keys,
                ..
            }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
                assert_eq!(conflicting_keys, vec!["key".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_temporary_context_cleanup() {
        let store = MemoryStore::new();
        let tenant = TenantId::now_v7();
        let mut stale = ExecutionContext::new(tenant, ContextScope::Temporary, None, None)
            .expect("context");
        stale.updated_at = Utc::now() - chrono::Duration::seconds(TEMPORARY_TTL_SECONDS + 60);
        ContextStore::insert(&store, &stale).await.expect("insert");

        let fresh = ExecutionContext::new(tenant, ContextScope::Temporary, None, None)
            .expect("context");
        ContextStore::insert(&store, &fresh).await.expect("insert");

        let removed = ContextStore::cleanup_expired_temporary(&store, tenant)
            .await
            .expect("cleanup");
        assert_eq!(removed, 1);
        assert!(ContextStore::get(&store, fresh.id, tenant)
            .await
            .expect("get")
            .is_some());
    }
}
