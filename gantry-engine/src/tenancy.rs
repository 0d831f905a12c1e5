//! Request-scoped execution context: tenant, deadline, cancellation.
//!
//! Passed explicitly through every service call; the kernel never holds a
//! global tenant. Writes require a tenant id and fail validation without
//! one.

use gantry_core::{TenantId, ValidationError};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-request context threaded through the scheduling kernel.
#[derive(Debug, Clone)]
pub struct RequestContext {
    tenant_id: Option<TenantId>,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    /// Context for a tenant-scoped request.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Context with no tenant; only valid for reads and admin paths.
    pub fn anonymous() -> Self {
        Self {
            tenant_id: None,
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Parse the `X-Tenant-ID` header value into a tenant context.
    pub fn from_header(value: &str) -> Result<Self, ValidationError> {
        let tenant_id =
            TenantId::from_str(value.trim()).map_err(|_| ValidationError::MalformedTenantId {
                input: value.to_string(),
            })?;
        Ok(Self::for_tenant(tenant_id))
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// The tenant id, or a validation failure naming the operation. Every
    /// write path goes through this.
    pub fn require_tenant(&self, operation: &str) -> Result<TenantId, ValidationError> {
        self.tenant_id.ok_or_else(|| ValidationError::MissingTenant {
            operation: operation.to_string(),
        })
    }

    /// Remaining budget until the deadline, if one was set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Request cancellation; observed at the next suspension point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::EntityIdType;

    #[test]
    fn test_require_tenant() {
        let ctx = RequestContext::anonymous();
        let err = ctx.require_tenant("create_session").unwrap_err();
        assert!(matches!(err, ValidationError::MissingTenant { .. }));

        let tenant = TenantId::now_v7();
        let ctx = RequestContext::for_tenant(tenant);
        assert_eq!(ctx.require_tenant("create_session").unwrap(), tenant);
    }

    #[test]
    fn test_from_header() {
        let tenant = TenantId::now_v7();
        let ctx = RequestContext::from_header(&tenant.to_string()).expect("parse");
        assert_eq!(ctx.tenant_id(), Some(tenant));

        let err = RequestContext::from_header("not-a-uuid").unwrap_err();
        assert!(matches!(err, ValidationError::MalformedTenantId { .. }));
    }

    #[test]
    fn test_cancellation_is_shared_across_clones() {
        let ctx = RequestContext::anonymous();
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_deadline() {
        let ctx = RequestContext::anonymous().with_timeout(Duration::from_secs(60));
        assert!(!ctx.deadline_exceeded());
        assert!(ctx.remaining().is_some_and(|r| r > Duration::from_secs(50)));

        let expired = RequestContext::anonymous().with_deadline(Instant::now());
        assert!(expired.deadline_exceeded());
    }
}
