//! GANTRY Locks - Fair Distributed Mutual Exclusion
//!
//! A lock manager over named string resources, backed by a key/value lease
//! store with compare-and-swap and TTL. Provides queue fairness, automatic
//! lease renewal, a closure form that guarantees release on all exit paths,
//! and local deadlock diagnostics.

mod manager;
mod store;

pub use manager::{AcquireOptions, LockGuard, LockInfo, LockManager};
pub use store::{Lease, LeaseStore, MemoryLeaseStore, WaitEntry};
