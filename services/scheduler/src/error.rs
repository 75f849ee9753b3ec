//! Scheduler error types.

use shipyard_id::{ContainerId, HostId};
use thiserror::Error;

use crate::config::PortRange;
use crate::store::StoreError;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that can occur during placement and harmonization.
///
/// Everything except [`SchedulerError::ConstraintFatal`] resolves to "try
/// again next harmonization cycle".
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no follower hosts detected when deploying")]
    NoFollowerHosts,

    #[error("no follower hosts met the given tag criteria when deploying")]
    NoTagMatch,

    #[error("no follower hosts had sufficient resources when deploying")]
    InsufficientResources,

    /// Candidate hosts were filtered down to nothing by a constraint.
    #[error("could not meet constraint '{constraint}' when deploying")]
    ConstraintUnmet { constraint: String },

    /// The placement can never succeed; callers must not redeploy.
    #[error("constraint '{constraint}' rejected deploy: {reason}")]
    ConstraintFatal { constraint: String, reason: String },

    #[error("constraint '{constraint}' has unusable value {value}")]
    InvalidConstraint { constraint: String, value: String },

    #[error("requested port {port} already in use on host {host}")]
    PortInUse { host: HostId, port: u16 },

    #[error("no ports left to allocate on host {host}")]
    NoPortsAvailable { host: HostId },

    #[error("port {port} is outside the allocatable range {range}")]
    InvalidPort { port: u16, range: PortRange },

    #[error("discovery port {0} already allocated")]
    DiscoveryPortInUse(u16),

    #[error("no discovery ports left to allocate")]
    NoDiscoveryPortsAvailable,

    #[error("host not found: {0}")]
    HostNotFound(HostId),

    #[error("corrupt record at {key}: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Names must be non-empty and free of `*` and `::`.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    #[error("container {container_id} not found for application {application}")]
    ContainerNotFound {
        application: String,
        container_id: ContainerId,
    },

    #[error("no engine registered under '{0}'")]
    EngineNotFound(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchedulerError {
    /// Returns true if the failed placement must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConstraintFatal { .. })
    }

    /// Returns true if the next harmonization pass may retry the placement.
    pub fn should_redeploy(&self) -> bool {
        !self.is_fatal()
    }
}
