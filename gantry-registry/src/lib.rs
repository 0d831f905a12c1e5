//! GANTRY Registry - Agent Discovery and Routing
//!
//! In-memory agent registry (indexed by id, capability, and performance
//! tier, with heartbeat TTL and a cached statistics view) plus the weighted
//! capability router with per-agent circuit breaking and workload rebalance
//! reporting.

mod registry;
mod router;

pub use registry::{AgentRegistry, RegistryStatistics, DEFAULT_HEARTBEAT_TTL};
pub use router::{
    AgentDirectory, AgentRouter, RebalanceReport, RouteDecision, RouteRequest,
};
