//! Cluster membership interface.
//!
//! Membership owns host records. The scheduler reads them fresh on every
//! placement and never persists them.

use std::sync::{PoisonError, RwLock};

use crate::model::{Host, HostMode};

/// Live view of the fleet.
pub trait Membership: Send + Sync {
    /// Every other member of the cluster.
    fn peers(&self) -> Vec<Host>;

    /// This node's own record.
    fn attributes(&self) -> Host;

    /// Whether this node is the elected controlling leader.
    fn is_controlling_leader(&self) -> bool {
        self.attributes().mode == HostMode::Leader
    }
}

/// Fixed membership for tests and single-process deployments.
#[derive(Debug)]
pub struct StaticMembership {
    local: Host,
    peers: RwLock<Vec<Host>>,
}

impl StaticMembership {
    pub fn new(local: Host, peers: Vec<Host>) -> Self {
        Self {
            local,
            peers: RwLock::new(peers),
        }
    }

    /// Replace the peer set, e.g. after a host leaves.
    pub fn set_peers(&self, peers: Vec<Host>) {
        *self.peers.write().unwrap_or_else(PoisonError::into_inner) = peers;
    }
}

impl Membership for StaticMembership {
    fn peers(&self) -> Vec<Host> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn attributes(&self) -> Host {
        self.local.clone()
    }
}
