//! Session lifecycle service.
//!
//! Every mutation of a session row happens inside the
//! `session:execution:{id}` lock; parent linking additionally holds
//! `session:parent:{parent}`. Events are published while the lock is held
//! so per-session event order is causal.

use crate::events::EventBus;
use crate::tenancy::RequestContext;
use chrono::Utc;
use gantry_core::{
    CapacityError, Checkpoint, GantryResult, NotFoundError, OrchestratorConfig, ResourceLimits,
    Session, SessionEvent, SessionId, SessionPriority, SessionStatus, SessionType,
    ValidationError,
};
use gantry_locks::{AcquireOptions, LockManager};
use gantry_storage::{QueryOptions, SessionFilter, SessionStats, SessionStore, TenantStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub title: String,
    pub initial_prompt: String,
    pub session_type: SessionType,
    pub priority: SessionPriority,
    pub agent_config: BTreeMap<String, Value>,
    pub model_identifier: Option<String>,
    pub parent_session_id: Option<SessionId>,
    pub limits: Option<ResourceLimits>,
    pub created_by: Option<String>,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl CreateSession {
    pub fn new(title: &str, initial_prompt: &str) -> Self {
        Self {
            title: title.to_string(),
            initial_prompt: initial_prompt.to_string(),
            session_type: SessionType::default(),
            priority: SessionPriority::default(),
            agent_config: BTreeMap::new(),
            model_identifier: None,
            parent_session_id: None,
            limits: None,
            created_by: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_agent_config(mut self, agent_config: BTreeMap<String, Value>) -> Self {
        self.agent_config = agent_config;
        self
    }

    pub fn with_parent(mut self, parent: SessionId) -> Self {
        self.parent_session_id = Some(parent);
        self
    }
}

/// One node of a session tree.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionTreeNode {
    pub session_id: SessionId,
    pub title: String,
    pub status: SessionStatus,
    pub session_type: SessionType,
    pub depth: usize,
    pub children: Vec<SessionTreeNode>,
}

/// A running session close to its duration budget.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AtRiskSession {
    pub session_id: SessionId,
    pub title: String,
    pub elapsed_seconds: f64,
    pub time_remaining_seconds: f64,
    pub health_score: f64,
}

/// Monitor snapshot: active counts, at-risk list, aggregate stats.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub active_sessions: usize,
    pub at_risk: Vec<AtRiskSession>,
    pub stats: SessionStats,
}

/// Session lifecycle service over the storage and lock ports.
pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    tenants: Arc<dyn TenantStore>,
    locks: Arc<LockManager>,
    events: EventBus,
    config: OrchestratorConfig,
    /// Lock-owner identity of this service instance
    owner: String,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        tenants: Arc<dyn TenantStore>,
        locks: Arc<LockManager>,
        events: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        let owner = format!("session-service-{}", uuid::Uuid::now_v7().simple());
        Self {
            sessions,
            tenants,
            locks,
            events,
            config,
            owner,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn lock_options(&self) -> AcquireOptions {
        AcquireOptions::default()
            .with_timeout(self.config.lock_acquire_timeout)
    }

    fn execution_lock(session_id: SessionId) -> String {
        format!("session:execution:{session_id}")
    }

    /// Create a session: validates, enforces the tenant's concurrent-session
    /// quota, links the parent under its lock, persists, and emits
    /// `SessionCreated`.
    pub async fn create_session(
        &self,
        ctx: &RequestContext,
        request: CreateSession,
    ) -> GantryResult<Session> {
        let tenant_id = ctx.require_tenant("create_session")?;

        let tenant = self
            .tenants
            .get(tenant_id)
            .await?
            .ok_or(NotFoundError::Tenant(tenant_id))?;
        if !tenant.is_active {
            return Err(ValidationError::InvalidValue {
                field: "tenant".into(),
                reason: format!("tenant {} is inactive", tenant.slug),
            }
            .into());
        }

        let active = self.sessions.count_active_by_tenant(tenant_id).await?;
        if active as i64 >= tenant.max_concurrent_sessions {
            return Err(CapacityError::QuotaExceeded {
                resource: "concurrent_sessions".into(),
                limit: tenant.max_concurrent_sessions,
            }
            .into());
        }

        let mut session = Session::new(tenant_id, &request.title, &request.initial_prompt)?
            .with_type(request.session_type)
            .with_priority(request.priority)
            .with_agent_config(request.agent_config)
            .with_tags(request.tags);
        session.model_identifier = request.model_identifier;
        session.created_by = request.created_by;
        session.metadata = request.metadata;
        if let Some(limits) = request.limits {
            limits.validate()?;
            session.limits = limits;
        }

        if let Some(parent_id) = request.parent_session_id {
            session.parent_id = Some(parent_id);
            let resource = format!("session:parent:{parent_id}");
            let sessions = Arc::clone(&self.sessions);
            let to_insert = session.clone();
            self.locks
                .with_lock(&resource, &self.owner, self.lock_options(), || async move {
                    if sessions.get(parent_id, tenant_id).await?.is_none() {
                        return Err(NotFoundError::Session(parent_id).into());
                    }
                    sessions.insert(&to_insert).await
                })
                .await?;
        } else {
            self.sessions.insert(&session).await?;
        }

        self.events.publish(SessionEvent::Created {
            session_id: session.id,
            title: session.title.clone(),
            session_type: session.session_type,
            created_by: session.created_by.clone(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            session_id = %session.id,
            session_type = %session.session_type,
            priority = %session.priority,
            "session created"
        );
        Ok(session)
    }

    /// Load a session; `include_checkpoints` hydrates the stored checkpoint
    /// history onto the entity.
    pub async fn get_session(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
        include_checkpoints: bool,
    ) -> GantryResult<Option<Session>> {
        let Some(tenant_id) = ctx.tenant_id() else {
            return Ok(None);
        };
        let Some(mut session) = self.sessions.get(session_id, tenant_id).await? else {
            return Ok(None);
        };
        if include_checkpoints {
            session.checkpoints = self.sessions.checkpoints(session_id, tenant_id).await?;
        }
        Ok(Some(session))
    }

    /// Start execution (`pending -> running`) under the execution lock.
    pub async fn start_session(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> GantryResult<Session> {
        let tenant_id = ctx.require_tenant("start_session")?;
        let sessions = Arc::clone(&self.sessions);
        let events = self.events.clone();

        self.locks
            .with_lock(
                &Self::execution_lock(session_id),
                &self.owner,
                self.lock_options(),
                || async move {
                    let Some(mut session) = sessions.get(session_id, tenant_id).await? else {
                        return Err(NotFoundError::Session(session_id).into());
                    };
                    let event = session.start_execution()?;
                    let committed = sessions.update(&session).await?;
                    events.publish(event);
                    tracing::info!(session_id = %session_id, "session started");
                    Ok(committed)
                },
            )
            .await
    }

    /// Complete with results, stamping quality metrics, under the execution
    /// lock. Emits `SessionStatusChanged` then `SessionCompleted`.
    pub async fn complete_session(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
        result: Value,
        success_rate: f64,
        confidence_score: Option<f64>,
    ) -> GantryResult<Session> {
        let tenant_id = ctx.require_tenant("complete_session")?;
        let sessions = Arc::clone(&self.sessions);
        let events = self.events.clone();

        self.locks
            .with_lock(
                &Self::execution_lock(session_id),
                &self.owner,
                self.lock_options(),
                || async move {
                    let Some(mut session) = sessions.get(session_id, tenant_id).await? else {
                        return Err(NotFoundError::Session(session_id).into());
                    };

                    session.metrics.success_rate = Some(success_rate);
                    if confidence_score.is_some() {
                        session.metrics.confidence_score = confidence_score;
                    }
                    let emitted = session.complete_with_result(result)?;
                    let committed = sessions.update(&session).await?;
                    events.publish_all(emitted);

                    tracing::info!(
                        session_id = %session_id,
                        success_rate,
                        duration = ?session.metrics.execution_duration_seconds,
                        "session completed"
                    );
                    Ok(committed)
                },
            )
            .await
    }

    /// Fail with a structured error record, under the execution lock. Emits
    /// `SessionStatusChanged` then `SessionFailed`.
    pub async fn fail_session(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
        error_type: &str,
        message: &str,
        error_context: BTreeMap<String, Value>,
        retryable: bool,
    ) -> GantryResult<Session> {
        let tenant_id = ctx.require_tenant("fail_session")?;
        let sessions = Arc::clone(&self.sessions);
        let events = self.events.clone();
        let error_type = error_type.to_string();
        let message = message.to_string();

        self.locks
            .with_lock(
                &Self::execution_lock(session_id),
                &self.owner,
                self.lock_options(),
                || async move {
                    let Some(mut session) = sessions.get(session_id, tenant_id).await? else {
                        return Err(NotFoundError::Session(session_id).into());
                    };

                    let emitted = session.fail_with_error(
                        &error_type,
                        &message,
                        error_context,
                        retryable,
                    )?;
                    let committed = sessions.update(&session).await?;
                    events.publish_all(emitted);

                    tracing::error!(
                        session_id = %session_id,
                        error_type = error_type.as_str(),
                        message = message.as_str(),
                        "session failed"
                    );
                    Ok(committed)
                },
            )
            .await
    }

    /// Retry a recoverable session: resets to `pending`, bumps the retry
    /// count, preserves checkpoints and metrics. Returns `None` when the
    /// session is missing or not recoverable.
    pub async fn retry_session(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> GantryResult<Option<Session>> {
        let tenant_id = ctx.require_tenant("retry_session")?;

        let Some(probe) = self.get_session(ctx, session_id, true).await? else {
            return Ok(None);
        };
        if !probe.is_recoverable() {
            tracing::warn!(session_id = %session_id, "session not recoverable");
            return Ok(None);
        }

        let sessions = Arc::clone(&self.sessions);
        let events = self.events.clone();
        let committed = self
            .locks
            .with_lock(
                &Self::execution_lock(session_id),
                &self.owner,
                self.lock_options(),
                || async move {
                    let Some(mut session) = sessions.get(session_id, tenant_id).await? else {
                        return Err(NotFoundError::Session(session_id).into());
                    };
                    session.checkpoints = sessions.checkpoints(session_id, tenant_id).await?;
                    let event = session.reset_for_retry()?;
                    // Checkpoints live in their own table; don't write them back
                    session.checkpoints.clear();
                    let committed = sessions.update(&session).await?;
                    events.publish(event);
                    tracing::info!(
                        session_id = %session_id,
                        retry_count = session.metrics.retry_count,
                        "session retry scheduled"
                    );
                    Ok(committed)
                },
            )
            .await?;
        Ok(Some(committed))
    }

    /// Cancel from any non-terminal state: active states stop, pre-run
    /// states cancel.
    pub async fn cancel_session(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
    ) -> GantryResult<Session> {
        let tenant_id = ctx.require_tenant("cancel_session")?;
        let sessions = Arc::clone(&self.sessions);
        let events = self.events.clone();

        self.locks
            .with_lock(
                &Self::execution_lock(session_id),
                &self.owner,
                self.lock_options(),
                || async move {
                    let Some(mut session) = sessions.get(session_id, tenant_id).await? else {
                        return Err(NotFoundError::Session(session_id).into());
                    };

                    // A running session cannot go straight to cancelled;
                    // stopping is its cancellation form.
                    let target = if session.status == SessionStatus::Running {
                        SessionStatus::Stopped
                    } else {
                        SessionStatus::Cancelled
                    };
                    let event = session.transition_to(target)?;
                    let committed = sessions.update(&session).await?;
                    events.publish(event);
                    Ok(committed)
                },
            )
            .await
    }

    /// Append a checkpoint; the store assigns the next sequence.
    pub async fn add_checkpoint(
        &self,
        ctx: &RequestContext,
        session_id: SessionId,
        data: Value,
        metadata: BTreeMap<String, Value>,
    ) -> GantryResult<Checkpoint> {
        let tenant_id = ctx.require_tenant("add_checkpoint")?;
        let checkpoint = self
            .sessions
            .add_checkpoint(session_id, tenant_id, data, metadata)
            .await?;
        tracing::debug!(
            session_id = %session_id,
            sequence = checkpoint.sequence,
            "checkpoint added"
        );
        Ok(checkpoint)
    }

    /// Filtered, paginated listing.
    pub async fn find_sessions(
        &self,
        ctx: &RequestContext,
        filter: &SessionFilter,
        options: QueryOptions,
    ) -> GantryResult<Vec<Session>> {
        let tenant_id = ctx.require_tenant("find_sessions")?;
        self.sessions.find(tenant_id, filter, options).await
    }

    /// Recursive session tree, bounded by `max_depth` (default from config).
    pub async fn session_tree(
        &self,
        ctx: &RequestContext,
        root_id: SessionId,
        max_depth: Option<usize>,
    ) -> GantryResult<Option<SessionTreeNode>> {
        let Some(tenant_id) = ctx.tenant_id() else {
            return Ok(None);
        };
        let max_depth = max_depth.unwrap_or(self.config.session_tree_max_depth);
        let Some(root) = self.sessions.get(root_id, tenant_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.build_tree(tenant_id, root, 0, max_depth).await?))
    }

    fn build_tree(
        &self,
        tenant_id: gantry_core::TenantId,
        session: Session,
        depth: usize,
        max_depth: usize,
    ) -> futures_util::future::BoxFuture<'_, GantryResult<SessionTreeNode>> {
        Box::pin(async move {
            let mut node = SessionTreeNode {
                session_id: session.id,
                title: session.title,
                status: session.status,
                session_type: session.session_type,
                depth,
                children: Vec::new(),
            };

            if depth + 1 < max_depth {
                for child in self.sessions.children(session.id, tenant_id).await? {
                    node.children
                        .push(self.build_tree(tenant_id, child, depth + 1, max_depth).await?);
                }
            }
            Ok(node)
        })
    }

    /// Monitor snapshot: active sessions, at-risk list (< 5 minutes of
    /// budget remaining), aggregate statistics.
    pub async fn monitor(&self, ctx: &RequestContext) -> GantryResult<MonitorReport> {
        let tenant_id = ctx.require_tenant("monitor")?;
        let active = self.sessions.find_active(tenant_id).await?;
        let now = Utc::now();
        let threshold = self.config.at_risk_threshold.as_secs_f64();

        let mut at_risk = Vec::new();
        for session in &active {
            if session.status != SessionStatus::Running {
                continue;
            }
            let Some(remaining) = session.time_remaining_seconds(now) else {
                continue;
            };
            if remaining < threshold {
                at_risk.push(AtRiskSession {
                    session_id: session.id,
                    title: session.title.clone(),
                    elapsed_seconds: session.limits.max_duration_seconds as f64 - remaining,
                    time_remaining_seconds: remaining,
                    health_score: session.health_score(now),
                });
            }
        }

        let stats = self.sessions.stats(tenant_id).await?;
        Ok(MonitorReport {
            active_sessions: active.len(),
            at_risk,
            stats,
        })
    }

    /// Transition running sessions past their duration budget to `timeout`.
    /// Returns the ids that were timed out.
    pub async fn sweep_timeouts(&self, ctx: &RequestContext) -> GantryResult<Vec<SessionId>> {
        let tenant_id = ctx.require_tenant("sweep_timeouts")?;
        let active = self.sessions.find_active(tenant_id).await?;
        let now = Utc::now();

        let mut timed_out = Vec::new();
        for session in active {
            if session.status != SessionStatus::Running {
                continue;
            }
            let expired = session
                .time_remaining_seconds(now)
                .is_some_and(|remaining| remaining <= 0.0);
            if !expired {
                continue;
            }

            let sessions = Arc::clone(&self.sessions);
            let events = self.events.clone();
            let session_id = session.id;
            let result: GantryResult<()> = self
                .locks
                .with_lock(
                    &Self::execution_lock(session_id),
                    &self.owner,
                    self.lock_options(),
                    || async move {
                        let Some(mut session) = sessions.get(session_id, tenant_id).await? else {
                            return Ok(());
                        };
                        // Recheck inside the lock; the executor may have
                        // settled it meanwhile.
                        if session.status != SessionStatus::Running {
                            return Ok(());
                        }
                        let event = session.transition_to(SessionStatus::Timeout)?;
                        sessions.update(&session).await?;
                        events.publish(event);
                        Ok(())
                    },
                )
                .await;
            match result {
                Ok(()) => timed_out.push(session_id),
                Err(error) => {
                    tracing::error!(session_id = %session_id, %error, "timeout sweep failed");
                }
            }
        }
        Ok(timed_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{EntityIdType, GantryError, Tenant, TenantId};
    use gantry_locks::MemoryLeaseStore;
    use gantry_storage::MemoryStore;
    use serde_json::json;

    struct Fixture {
        service: SessionService,
        tenant_id: TenantId,
    }

    async fn fixture_with_quota(max_concurrent: i64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let tenant = Tenant::new("Acme Robotics", "acme-robotics")
            .expect("tenant")
            .with_max_concurrent_sessions(max_concurrent);
        let tenant_id = tenant.id;
        TenantStore::insert(store.as_ref(), &tenant)
            .await
            .expect("tenant insert");

        let locks = Arc::new(LockManager::new(Arc::new(MemoryLeaseStore::new())));
        let service = SessionService::new(
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&store) as Arc<dyn TenantStore>,
            locks,
            EventBus::default(),
            OrchestratorConfig::default(),
        );
        Fixture { service, tenant_id }
    }

    #[tokio::test]
    async fn test_create_requires_tenant() {
        let fixture = fixture_with_quota(2).await;
        let err = fixture
            .service
            .create_session(
                &RequestContext::anonymous(),
                CreateSession::new("IMPL auth", "Implement OAuth2"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_create_start_complete_emits_events() {
        let fixture = fixture_with_quota(2).await;
        let ctx = RequestContext::for_tenant(fixture.tenant_id);
        let mut rx = fixture.service.events().subscribe();

        let session = fixture
            .service
            .create_session(&ctx, CreateSession::new("IMPL auth", "Implement OAuth2"))
            .await
            .expect("create");
        assert_eq!(session.status, SessionStatus::Pending);

        fixture
            .service
            .start_session(&ctx, session.id)
            .await
            .expect("start");
        let done = fixture
            .service
            .complete_session(&ctx, session.id, json!({"ok": true}), 1.0, Some(0.9))
            .await
            .expect("complete");
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.metrics.success_rate, Some(1.0));

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(
            types,
            vec![
                "SessionCreated",
                "SessionStatusChanged",
                "SessionStatusChanged",
                "SessionCompleted",
            ]
        );
    }

    #[tokio::test]
    async fn test_quota_enforcement_leaves_no_row() {
        let fixture = fixture_with_quota(1).await;
        let ctx = RequestContext::for_tenant(fixture.tenant_id);

        let first = fixture
            .service
            .create_session(&ctx, CreateSession::new("IMPL auth", "Implement OAuth2"))
            .await
            .expect("create");
        fixture
            .service
            .start_session(&ctx, first.id)
            .await
            .expect("start");

        let err = fixture
            .service
            .create_session(&ctx, CreateSession::new("IMPL billing", "Implement invoices"))
            .await
            .unwrap_err();
        match err {
            GantryError::Capacity(CapacityError::QuotaExceeded { resource, limit }) => {
                assert_eq!(resource, "concurrent_sessions");
                assert_eq!(limit, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let all = fixture
            .service
            .find_sessions(&ctx, &SessionFilter::default(), QueryOptions::default())
            .await
            .expect("find");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_parent_linking_requires_existing_parent() {
        let fixture = fixture_with_quota(10).await;
        let ctx = RequestContext::for_tenant(fixture.tenant_id);

        let err = fixture
            .service
            .create_session(
                &ctx,
                CreateSession::new("IMPL child", "work").with_parent(SessionId::now_v7()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let parent = fixture
            .service
            .create_session(&ctx, CreateSession::new("IMPL parent", "work"))
            .await
            .expect("parent");
        let child = fixture
            .service
            .create_session(
                &ctx,
                CreateSession::new("IMPL child", "work").with_parent(parent.id),
            )
            .await
            .expect("child");

        let loaded = fixture
            .service
            .get_session(&ctx, parent.id, false)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.child_ids, vec![child.id]);
    }

    #[tokio::test]
    async fn test_retry_requires_checkpoint() {
        let fixture = fixture_with_quota(10).await;
        let ctx = RequestContext::for_tenant(fixture.tenant_id);

        let session = fixture
            .service
            .create_session(&ctx, CreateSession::new("IMPL auth", "Implement OAuth2"))
            .await
            .expect("create");
        fixture
            .service
            .start_session(&ctx, session.id)
            .await
            .expect("start");
        fixture
            .service
            .fail_session(&ctx, session.id, "RuntimeError", "boom", BTreeMap::new(), true)
            .await
            .expect("fail");

        // No checkpoints -> not recoverable
        assert!(fixture
            .service
            .retry_session(&ctx, session.id)
            .await
            .expect("retry call")
            .is_none());

        fixture
            .service
            .add_checkpoint(&ctx, session.id, json!({"step": 1}), BTreeMap::new())
            .await
            .expect("checkpoint");

        let retried = fixture
            .service
            .retry_session(&ctx, session.id)
            .await
            .expect("retry call")
            .expect("recoverable");
        assert_eq!(retried.status, SessionStatus::Pending);
        assert_eq!(retried.metrics.retry_count, 1);
    }

    #[tokio::test]
    async fn test_session_tree_depth_bound() {
        let fixture = fixture_with_quota(10).await;
        let ctx = RequestContext::for_tenant(fixture.tenant_id);

        let root = fixture
            .service
            .create_session(&ctx, CreateSession::new("IMPL root", "work"))
            .await
            .expect("root");
        let child = fixture
            .service
            .create_session(
                &ctx,
                CreateSession::new("IMPL child", "work").with_parent(root.id),
            )
            .await
            .expect("child");
        fixture
            .service
            .create_session(
                &ctx,
                CreateSession::new("IMPL grandchild", "work").with_parent(child.id),
            )
            .await
            .expect("grandchild");

        let tree = fixture
            .service
            .session_tree(&ctx, root.id, Some(2))
            .await
            .expect("tree")
            .expect("present");
        assert_eq!(tree.children.len(), 1);
        // Depth bound of 2 cuts the grandchild
        assert!(tree.children[0].children.is_empty());

        let full = fixture
            .service
            .session_tree(&ctx, root.id, Some(5))
            .await
            .expect("tree")
            .expect("present");
        assert_eq!(full.children[0].children.len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_flags_at_risk() {
        let fixture = fixture_with_quota(10).await;
        let ctx = RequestContext::for_tenant(fixture.tenant_id);

        let session = fixture
            .service
            .create_session(
                &ctx,
                CreateSession {
                    limits: Some(ResourceLimits {
                        max_duration_seconds: 300,
                        ..Default::default()
                    }),
                    ..CreateSession::new("IMPL auth", "Implement OAuth2")
                },
            )
            .await
            .expect("create");
        fixture
            .service
            .start_session(&ctx, session.id)
            .await
            .expect("start");

        let report = fixture.service.monitor(&ctx).await.expect("monitor");
        assert_eq!(report.active_sessions, 1);
        // 300s budget is already under the 5-minute threshold
        assert_eq!(report.at_risk.len(), 1);
        assert_eq!(report.at_risk[0].session_id, session.id);
        assert_eq!(report.stats.by_status.get("running"), Some(&1));
    }

    #[tokio::test]
    async fn test_cancel_paths() {
        let fixture = fixture_with_quota(10).await;
        let ctx = RequestContext::for_tenant(fixture.tenant_id);

        let pending = fixture
            .service
            .create_session(&ctx, CreateSession::new("IMPL auth", "work"))
            .await
            .expect("create");
        let cancelled = fixture
            .service
            .cancel_session(&ctx, pending.id)
            .await
            .expect("cancel");
        assert_eq!(cancelled.status, SessionStatus::Cancelled);

        let running = fixture
            .service
            .create_session(&ctx, CreateSession::new("IMPL billing", "work"))
            .await
            .expect("create");
        fixture
            .service
            .start_session(&ctx, running.id)
            .await
            .expect("start");
        let stopped = fixture
            .service
            .cancel_session(&ctx, running.id)
            .await
            .expect("cancel");
        assert_eq!(stopped.status, SessionStatus::Stopped);
    }
}
