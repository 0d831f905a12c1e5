//! GANTRY Storage - Repository Ports and In-Memory Implementation
//!
//! One async trait per entity plus a shared `QueryOptions` value type. The
//! relational implementation lives behind the same ports; `MemoryStore` is
//! the reference implementation used by tests and single-process
//! deployments, and it enforces the same write-boundary invariants the
//! database triggers do.

mod memory;
mod ports;

pub use memory::MemoryStore;
pub use ports::{
    AgentStore, ContextStore, FineTuningStore, QueryOptions, SessionFilter, SessionStats,
    SessionStore, TaskStore, TenantStore,
};
