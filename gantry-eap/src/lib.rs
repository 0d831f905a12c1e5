//! GANTRY EAP - External Agent Protocol
//!
//! Wire DTOs and the HTTP client used to dispatch work to remote agents
//! registered with `is_external` metadata. See `client` for the retry and
//! health-probe policies.

mod client;
mod types;

pub use client::EapClient;
pub use types::{
    EapArtifact, EapHeartbeat, EapResultStatus, EapStatus, EapTaskAssignment, EapTaskResult,
};
