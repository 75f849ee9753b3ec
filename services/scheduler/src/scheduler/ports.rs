//! Host port and discovery port allocation.

use std::collections::HashSet;

use rand::Rng;
use shipyard_id::HostId;
use tracing::debug;

use super::Scheduler;
use crate::config::PortRange;
use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{Container, Host};

/// How a container's host port is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRequest {
    /// Host networking: the container port is the host port.
    HostNetwork(u16),
    /// Operator-pinned host port.
    Pinned(u16),
    /// Draw from the container range.
    Random,
}

impl PortRequest {
    pub fn for_container(container: &Container) -> Self {
        match (container.uses_host_network(), container.container_port, container.host_port) {
            (true, Some(port), _) => Self::HostNetwork(port),
            (_, _, Some(port)) => Self::Pinned(port),
            _ => Self::Random,
        }
    }

    pub fn is_random(&self) -> bool {
        matches!(self, Self::Random)
    }
}

/// Pick a host port.
///
/// `utilized` holds ports of other containers on the host and
/// `containers_on_host` their count. Explicit requests are never reassigned.
pub fn allocate_port<R: Rng + ?Sized>(
    request: PortRequest,
    range: PortRange,
    utilized: &HashSet<u16>,
    containers_on_host: usize,
    host: &HostId,
    rng: &mut R,
) -> SchedulerResult<u16> {
    match request {
        PortRequest::HostNetwork(port) => {
            if utilized.contains(&port) {
                return Err(SchedulerError::PortInUse {
                    host: host.clone(),
                    port,
                });
            }
            Ok(port)
        }
        PortRequest::Pinned(port) => {
            if !range.contains(port) {
                return Err(SchedulerError::InvalidPort { port, range });
            }
            if utilized.contains(&port) {
                return Err(SchedulerError::PortInUse {
                    host: host.clone(),
                    port,
                });
            }
            Ok(port)
        }
        PortRequest::Random => {
            let in_range = utilized.iter().filter(|p| range.contains(**p)).count();
            if containers_on_host >= range.size() || in_range >= range.size() {
                return Err(SchedulerError::NoPortsAvailable { host: host.clone() });
            }
            Ok(draw_free(range, utilized, rng))
        }
    }
}

/// Uniform draws until one misses `taken`. Caller guarantees a free port.
fn draw_free<R: Rng + ?Sized>(range: PortRange, taken: &HashSet<u16>, rng: &mut R) -> u16 {
    loop {
        let port = rng.random_range(range.min..=range.max);
        if !taken.contains(&port) {
            return port;
        }
    }
}

impl Scheduler {
    /// Allocate a host port for `container` on `host`.
    ///
    /// Other containers are read across every application; the container's
    /// own stored record is not counted against it.
    pub async fn allocate_host_port(&self, host: &Host, container: &Container) -> SchedulerResult<u16> {
        let on_host: Vec<Container> = self
            .get_all_containers()
            .await?
            .into_iter()
            .filter(|c| c.is_on(&host.id))
            .filter(|c| c.id.is_none() || c.id != container.id)
            .collect();
        let utilized: HashSet<u16> = on_host.iter().filter_map(|c| c.host_port).collect();

        let request = PortRequest::for_container(container);
        let port = allocate_port(
            request,
            self.config().container_ports,
            &utilized,
            on_host.len(),
            &host.id,
            &mut rand::rng(),
        )?;

        debug!(host = %host.id, port, ?request, "Allocated host port");
        Ok(port)
    }

    /// Allocate a load-balancer discovery port for a new application.
    ///
    /// A requested port must be inside the load-balancer range and not held
    /// by another application.
    pub async fn allocate_loadbalancer_port(&self, requested: Option<u16>) -> SchedulerResult<u16> {
        let applications = self.list_applications().await?;
        let taken: HashSet<u16> = applications.iter().filter_map(|a| a.discovery_port).collect();
        let range = self.config().loadbalancer_ports;

        match requested {
            Some(port) if !range.contains(port) => Err(SchedulerError::InvalidPort { port, range }),
            Some(port) if taken.contains(&port) => Err(SchedulerError::DiscoveryPortInUse(port)),
            Some(port) => Ok(port),
            None => {
                let in_range = taken.iter().filter(|p| range.contains(**p)).count();
                if applications.len() >= range.size() || in_range >= range.size() {
                    return Err(SchedulerError::NoDiscoveryPortsAvailable);
                }
                Ok(draw_free(range, &taken, &mut rand::rng()))
            }
        }
    }
}
