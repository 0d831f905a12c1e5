//! GANTRY Engine - Session Scheduling Kernel
//!
//! The session lifecycle service, the executor that multiplexes internal
//! and external agents, agent lifecycle and routing, the fine-tuning
//! collaborator, request-scoped tenancy, and the event bus - wired together
//! by an explicit `Kernel`.

mod agents;
mod contexts;
mod events;
mod executor;
mod fine_tuning;
mod kernel;
mod ports;
mod session_service;
mod tasks;
mod tenancy;
mod workbench;

pub use agents::{AgentService, ExternalRegistration, StoreDirectory};
pub use contexts::ContextService;
pub use events::EventBus;
pub use executor::{resolve_agent_name, SessionExecutor};
pub use fine_tuning::FineTuningService;
pub use kernel::Kernel;
pub use ports::{ExecutionOutcome, ExecutionPort, ExternalAgentPort};
pub use session_service::{
    AtRiskSession, CreateSession, MonitorReport, SessionService, SessionTreeNode,
};
pub use tasks::{CreateTask, TaskService};
pub use tenancy::RequestContext;
pub use workbench::WorkbenchClient;
