//! Lease storage abstraction.
//!
//! Acquisition, renewal, and release must each be a single logical round
//! trip with check-and-act semantics, so a networked implementation can map
//! them onto a server-side script or CAS primitive. Lease metadata shares
//! the TTL of the lease itself.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gantry_core::{GantryResult, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// A held lease on a named resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub resource: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub renewal_count: u32,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining duration until expiry, `None` once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            (self.expires_at - now).to_std().ok()
        }
    }
}

/// An entry in a resource's fair wait queue.
///
/// Entries carry the caller's acquisition timeout as their own TTL; expired
/// entries are pruned on every queue read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitEntry {
    pub request_id: String,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WaitEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Key/value lease store with compare-and-swap and TTL semantics.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Acquire the lease iff the resource is free or its lease has expired.
    /// Returns the granted lease, or `None` when another owner holds it.
    async fn try_acquire(
        &self,
        resource: &str,
        owner: &str,
        lease_duration: Duration,
    ) -> GantryResult<Option<Lease>>;

    /// Extend the lease iff `owner` still holds it. Returns the renewed
    /// lease, or `None` when ownership was lost.
    async fn renew(
        &self,
        resource: &str,
        owner: &str,
        lease_duration: Duration,
    ) -> GantryResult<Option<Lease>>;

    /// Check-owner-and-delete. Returns whether a lease held by `owner` was
    /// removed; releasing a foreign or absent lease is a no-op returning
    /// `false`.
    async fn release(&self, resource: &str, owner: &str) -> GantryResult<bool>;

    /// Read the current lease, if any (expired leases are reported as
    /// absent).
    async fn get(&self, resource: &str) -> GantryResult<Option<Lease>>;

    /// Admin override: drop the lease regardless of owner.
    async fn force_remove(&self, resource: &str) -> GantryResult<()>;

    /// Enroll a waiter in the resource's fair queue.
    async fn enqueue_waiter(&self, resource: &str, entry: WaitEntry) -> GantryResult<()>;

    /// Remove a waiter from the queue (timeout, success, or error cleanup).
    async fn remove_waiter(&self, resource: &str, request_id: &str) -> GantryResult<()>;

    /// The request id of the highest-priority non-expired waiter, pruning
    /// expired entries as a side effect. Ties break by enqueue time.
    async fn head_waiter(&self, resource: &str) -> GantryResult<Option<String>>;

    /// Number of live waiters for diagnostics.
    async fn waiter_count(&self, resource: &str) -> GantryResult<usize>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

#[derive(Default)]
struct MemoryLeaseState {
    leases: HashMap<String, Lease>,
    queues: HashMap<String, Vec<WaitEntry>>,
}

/// In-memory lease store for tests and single-process deployments.
///
/// A single mutex over the whole state makes each operation atomic, matching
/// the single-round-trip contract of a networked backend.
#[derive(Default)]
pub struct MemoryLeaseStore {
    state: Mutex<MemoryLeaseState>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn chrono_duration(duration: Duration) -> GantryResult<ChronoDuration> {
        ChronoDuration::from_std(duration).map_err(|e| {
            StorageError::InsertFailed {
                entity: "lease".into(),
                reason: format!("invalid lease duration: {e}"),
            }
            .into()
        })
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_acquire(
        &self,
        resource: &str,
        owner: &str,
        lease_duration: Duration,
    ) -> GantryResult<Option<Lease>> {
        let now = Utc::now();
        let ttl = Self::chrono_duration(lease_duration)?;
        let mut state = self.state.lock().await;

        if let Some(existing) = state.leases.get(resource) {
            if !existing.is_expired(now) {
                return Ok(None);
            }
        }

        let lease = Lease {
            resource: resource.to_string(),
            owner: owner.to_string(),
            acquired_at: now,
            expires_at: now + ttl,
            renewal_count: 0,
        };
        state.leases.insert(resource.to_string(), lease.clone());
        Ok(Some(lease))
    }

    async fn renew(
        &self,
        resource: &str,
        owner: &str,
        lease_duration: Duration,
    ) -> GantryResult<Option<Lease>> {
        let now = Utc::now();
        let ttl = Self::chrono_duration(lease_duration)?;
        let mut state = self.state.lock().await;

        match state.leases.get_mut(resource) {
            Some(lease) if lease.owner == owner && !lease.is_expired(now) => {
                lease.expires_at = now + ttl;
                lease.renewal_count += 1;
                Ok(Some(lease.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release(&self, resource: &str, owner: &str) -> GantryResult<bool> {
        let mut state = self.state.lock().await;
        match state.leases.get(resource) {
            Some(lease) if lease.owner == owner => {
                state.leases.remove(resource);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, resource: &str) -> GantryResult<Option<Lease>> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(state
            .leases
            .get(resource)
            .filter(|l| !l.is_expired(now))
            .cloned())
    }

    async fn force_remove(&self, resource: &str) -> GantryResult<()> {
        let mut state = self.state.lock().await;
        state.leases.remove(resource);
        Ok(())
    }

    async fn enqueue_waiter(&self, resource: &str, entry: WaitEntry) -> GantryResult<()> {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(resource.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn remove_waiter(&self, resource: &str, request_id: &str) -> GantryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(queue) = state.queues.get_mut(resource) {
            queue.retain(|e| e.request_id != request_id);
            if queue.is_empty() {
                state.queues.remove(resource);
            }
        }
        Ok(())
    }

    async fn head_waiter(&self, resource: &str) -> GantryResult<Option<String>> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let Some(queue) = state.queues.get_mut(resource) else {
            return Ok(None);
        };

        queue.retain(|e| !e.is_expired(now));

        let head = queue
            .iter()
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.enqueued_at.cmp(&b.enqueued_at))
            })
            .map(|e| e.request_id.clone());

        if queue.is_empty() {
            state.queues.remove(resource);
        }
        Ok(head)
    }

    async fn waiter_count(&self, resource: &str) -> GantryResult<usize> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(state
            .queues
            .get(resource)
            .map(|q| q.iter().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, priority: i32, timeout: Duration) -> WaitEntry {
        let now = Utc::now();
        WaitEntry {
            request_id: id.to_string(),
            priority,
            enqueued_at: now,
            expires_at: now + ChronoDuration::from_std(timeout).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let store = MemoryLeaseStore::new();
        let lease = store
            .try_acquire("lock:R", "a", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(lease.is_some());

        let second = store
            .try_acquire("lock:R", "b", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken() {
        let store = MemoryLeaseStore::new();
        store
            .try_acquire("lock:R", "a", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let taken = store
            .try_acquire("lock:R", "b", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(taken.map(|l| l.owner), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_release_checks_owner() {
        let store = MemoryLeaseStore::new();
        store
            .try_acquire("lock:R", "a", Duration::from_secs(30))
            .await
            .unwrap();

        assert!(!store.release("lock:R", "b").await.unwrap());
        assert!(store.get("lock:R").await.unwrap().is_some());

        assert!(store.release("lock:R", "a").await.unwrap());
        assert!(store.get("lock:R").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_release_leaves_store_clean() {
        let store = MemoryLeaseStore::new();
        store
            .try_acquire("lock:R", "a", Duration::from_secs(30))
            .await
            .unwrap();
        store.release("lock:R", "a").await.unwrap();

        assert!(store.get("lock:R").await.unwrap().is_none());
        assert_eq!(store.waiter_count("lock:R").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_renew_extends_and_counts() {
        let store = MemoryLeaseStore::new();
        let lease = store
            .try_acquire("lock:R", "a", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        let renewed = store
            .renew("lock:R", "a", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        assert!(renewed.expires_at > lease.expires_at);
        assert_eq!(renewed.renewal_count, 1);

        // Foreign owner cannot renew
        assert!(store
            .renew("lock:R", "b", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_queue_priority_then_fifo() {
        let store = MemoryLeaseStore::new();
        let timeout = Duration::from_secs(10);
        store.enqueue_waiter("lock:R", entry("low", 0, timeout)).await.unwrap();
        store.enqueue_waiter("lock:R", entry("high", 10, timeout)).await.unwrap();
        store.enqueue_waiter("lock:R", entry("medium", 5, timeout)).await.unwrap();

        assert_eq!(
            store.head_waiter("lock:R").await.unwrap(),
            Some("high".to_string())
        );

        store.remove_waiter("lock:R", "high").await.unwrap();
        assert_eq!(
            store.head_waiter("lock:R").await.unwrap(),
            Some("medium".to_string())
        );

        store.remove_waiter("lock:R", "medium").await.unwrap();
        assert_eq!(
            store.head_waiter("lock:R").await.unwrap(),
            Some("low".to_string())
        );
    }

    #[tokio::test]
    async fn test_expired_waiters_are_pruned() {
        let store = MemoryLeaseStore::new();
        store
            .enqueue_waiter("lock:R", entry("stale", 10, Duration::from_millis(1)))
            .await
            .unwrap();
        store
            .enqueue_waiter("lock:R", entry("live", 0, Duration::from_secs(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            store.head_waiter("lock:R").await.unwrap(),
            Some("live".to_string())
        );
        assert_eq!(store.waiter_count("lock:R").await.unwrap(), 1);
    }
}
