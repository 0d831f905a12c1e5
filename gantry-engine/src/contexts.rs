//! Execution-context service: creation, versioned updates, merging.
//!
//! Thin orchestration over the `ContextStore` port; the entity itself (in
//! `gantry-context`) owns dot-path access, history, and merge semantics.

use crate::tenancy::RequestContext;
use gantry_context::ExecutionContext;
use gantry_core::{
    ContextId, ContextScope, GantryResult, MergeStrategy, NotFoundError, SessionId,
};
use gantry_storage::ContextStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Service for stored execution contexts.
pub struct ContextService {
    contexts: Arc<dyn ContextStore>,
}

impl ContextService {
    pub fn new(contexts: Arc<dyn ContextStore>) -> Self {
        Self { contexts }
    }

    /// Create a context in the given scope. Scope rules are enforced by the
    /// entity constructor.
    pub async fn create_context(
        &self,
        ctx: &RequestContext,
        scope: ContextScope,
        session_id: Option<SessionId>,
        agent_id: Option<gantry_core::AgentId>,
        initial_data: Option<Value>,
    ) -> GantryResult<ExecutionContext> {
        let tenant_id = ctx.require_tenant("create_context")?;
        let mut context = ExecutionContext::new(tenant_id, scope, session_id, agent_id)?;
        if let Some(data) = initial_data {
            context = context.with_data(data);
        }
        self.contexts.insert(&context).await?;
        tracing::debug!(context_id = %context.id, scope = %scope, "context created");
        Ok(context)
    }

    pub async fn get_context(
        &self,
        ctx: &RequestContext,
        context_id: ContextId,
    ) -> GantryResult<Option<ExecutionContext>> {
        let Some(tenant_id) = ctx.tenant_id() else {
            return Ok(None);
        };
        self.contexts.get(context_id, tenant_id).await
    }

    /// Apply dot-path updates against an expected version. On a version
    /// mismatch the caller receives `ContextConflict` and is expected to
    /// reload and retry.
    pub async fn update_context(
        &self,
        ctx: &RequestContext,
        context_id: ContextId,
        updates: BTreeMap<String, Value>,
        expected_version: i64,
    ) -> GantryResult<ExecutionContext> {
        let tenant_id = ctx.require_tenant("update_context")?;
        self.contexts
            .update(context_id, tenant_id, updates, expected_version)
            .await
    }

    /// Merge two stored contexts into a new one and persist it. Cross-tenant
    /// merges are rejected by the entity.
    pub async fn merge_contexts(
        &self,
        ctx: &RequestContext,
        source_id: ContextId,
        target_id: ContextId,
        strategy: MergeStrategy,
    ) -> GantryResult<ExecutionContext> {
        let tenant_id = ctx.require_tenant("merge_contexts")?;
        let source = self
            .contexts
            .get(source_id, tenant_id)
            .await?
            .ok_or(NotFoundError::Context(source_id))?;
        let target = self
            .contexts
            .get(target_id, tenant_id)
            .await?
            .ok_or(NotFoundError::Context(target_id))?;

        let merged = source.merge(&target, strategy)?;
        self.contexts.insert(&merged).await?;
        tracing::info!(
            source = %source_id,
            target = %target_id,
            merged = %merged.id,
            strategy = %strategy,
            "contexts merged"
        );
        Ok(merged)
    }

    /// Promote a context to `global` scope by cloning it wider.
    pub async fn promote_to_global(
        &self,
        ctx: &RequestContext,
        context_id: ContextId,
    ) -> GantryResult<ExecutionContext> {
        let tenant_id = ctx.require_tenant("promote_to_global")?;
        let context = self
            .contexts
            .get(context_id, tenant_id)
            .await?
            .ok_or(NotFoundError::Context(context_id))?;

        let promoted = context.clone_as(Some(ContextScope::Global));
        self.contexts.insert(&promoted).await?;
        Ok(promoted)
    }

    /// Drop expired temporary contexts. Returns the number removed.
    pub async fn cleanup_temporary(&self, ctx: &RequestContext) -> GantryResult<usize> {
        let tenant_id = ctx.require_tenant("cleanup_temporary")?;
        self.contexts.cleanup_expired_temporary(tenant_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{EntityIdType, TenantId};
    use gantry_storage::MemoryStore;
    use serde_json::json;

    fn service() -> (ContextService, RequestContext) {
        let store = Arc::new(MemoryStore::new());
        (
            ContextService::new(store as Arc<dyn ContextStore>),
            RequestContext::for_tenant(TenantId::now_v7()),
        )
    }

    #[tokio::test]
    async fn test_create_update_conflict_cycle() {
        let (service, ctx) = service();
        let context = service
            .create_context(&ctx, ContextScope::Global, None, None, None)
            .await
            .expect("create");

        let mut updates = BTreeMap::new();
        updates.insert("build.target".to_string(), json!("linux"));
        let updated = service
            .update_context(&ctx, context.id, updates.clone(), 1)
            .await
            .expect("update");
        assert_eq!(updated.version, 2);
        assert_eq!(updated.get("build.target"), Some(&json!("linux")));

        // Stale version: reload-and-retry contract
        let err = service
            .update_context(&ctx, context.id, updates.clone(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "concurrency");

        let current = service
            .get_context(&ctx, context.id)
            .await
            .expect("get")
            .expect("present");
        service
            .update_context(&ctx, context.id, updates, current.version)
            .await
            .expect("retry with fresh version");
    }

    #[tokio::test]
    async fn test_merge_persists_new_context() {
        let (service, ctx) = service();
        let a = service
            .create_context(
                &ctx,
                ContextScope::Temporary,
                None,
                None,
                Some(json!({"key": "ours"})),
            )
            .await
            .expect("create a");
        let b = service
            .create_context(
                &ctx,
                ContextScope::Global,
                None,
                None,
                Some(json!({"key": "theirs"})),
            )
            .await
            .expect("create b");

        let merged = service
            .merge_contexts(&ctx, a.id, b.id, MergeStrategy::LastWriteWins)
            .await
            .expect("merge");
        assert_eq!(merged.scope, ContextScope::Global);
        assert_eq!(merged.get("key"), Some(&json!("theirs")));

        let reloaded = service
            .get_context(&ctx, merged.id)
            .await
            .expect("get")
            .expect("persisted");
        assert_eq!(reloaded.id, merged.id);
    }

    #[tokio::test]
    async fn test_promote_to_global() {
        let (service, ctx) = service();
        let context = service
            .create_context(
                &ctx,
                ContextScope::Temporary,
                None,
                None,
                Some(json!({"scratch": 1})),
            )
            .await
            .expect("create");

        let promoted = service
            .promote_to_global(&ctx, context.id)
            .await
            .expect("promote");
        assert_eq!(promoted.scope, ContextScope::Global);
        assert_eq!(promoted.get("scratch"), Some(&json!(1)));
        assert_ne!(promoted.id, context.id);
    }
}
