//! Per-host replica quota.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;
use shipyard_id::HostId;
use shipyard_reconcile::{order_for_removal, ReplicaDelta};
use tracing::{info, warn};

use super::{count, Constraint, DeployRequest};
use crate::error::SchedulerResult;
use crate::model::{Application, Container, Host, Tags, HOST_TAG};
use crate::scheduler::{ContainerOverrides, Scheduler};

pub(super) const NAME: &str = "per_host";

#[derive(Debug, Clone, Copy, Default)]
pub struct PerHostConstraint;

/// Containers keyed by the host they run on or are pinned to.
///
/// Containers with neither land under `None`.
fn group_by_host(containers: Vec<Container>) -> BTreeMap<Option<HostId>, Vec<Container>> {
    let mut groups: BTreeMap<Option<HostId>, Vec<Container>> = BTreeMap::new();
    for container in containers {
        groups.entry(container.pinned_host()).or_default().push(container);
    }
    groups
}

/// Hosts held to the quota: every follower peer, plus this node when
/// `per_host_include_self` is set, whatever its mode.
fn quota_hosts(scheduler: &Scheduler) -> Vec<Host> {
    let mut hosts: Vec<Host> = scheduler
        .live_hosts(false)
        .into_iter()
        .filter(Host::is_follower)
        .collect();

    if scheduler.config().per_host_include_self {
        let local = scheduler.membership().attributes();
        if hosts.iter().all(|h| h.id != local.id) {
            hosts.push(local);
        }
    }
    hosts
}

fn pinned_to(host: &HostId) -> ContainerOverrides {
    let mut tags = Tags::new();
    tags.insert(HOST_TAG.to_string(), json!(host.as_str()));
    ContainerOverrides {
        tags,
        ..ContainerOverrides::default()
    }
}

#[async_trait]
impl Constraint for PerHostConstraint {
    async fn deploy(
        &self,
        scheduler: &Scheduler,
        request: &DeployRequest<'_>,
        hosts: Vec<Host>,
    ) -> SchedulerResult<Vec<Host>> {
        let quota = count(&request.container.tags, NAME)?;
        let containers = scheduler.get_containers(request.application_name).await?;

        Ok(hosts
            .into_iter()
            .filter(|host| containers.iter().filter(|c| c.is_on(&host.id)).count() < quota)
            .collect())
    }

    /// Bring every quota host to exactly the quota and drain everything else.
    async fn harmonize(&self, scheduler: &Scheduler, application: &Application) -> SchedulerResult<()> {
        let quota = count(&application.tags, NAME)?;
        let mut by_host = group_by_host(scheduler.get_containers(&application.id).await?);

        let followers = quota_hosts(scheduler);

        for follower in &followers {
            let on_host = by_host.remove(&Some(follower.id.clone())).unwrap_or_default();

            match ReplicaDelta::between(quota, on_host.len()) {
                ReplicaDelta::Converged => {}
                ReplicaDelta::Add(n) => {
                    info!(application = %application.id, host = %follower.id, add = n, "Under per-host quota");
                    for _ in 0..n {
                        if let Err(e) = scheduler
                            .deploy_container(&application.id, pinned_to(&follower.id))
                            .await
                        {
                            warn!(application = %application.id, host = %follower.id, error = %e, "Failed to deploy container");
                        }
                    }
                }
                ReplicaDelta::Remove(n) => {
                    info!(application = %application.id, host = %follower.id, remove = n, "Over per-host quota");
                    let victims = order_for_removal(on_host, |c| c.status.removal_priority());
                    for id in victims.iter().take(n).filter_map(|c| c.id) {
                        scheduler.remove_container(&application.id, id).await?;
                    }
                }
            }
        }

        // Anything left is not on a follower.
        for (host, stray) in by_host {
            info!(application = %application.id, host = ?host, count = stray.len(), "Draining containers");
            for id in stray.iter().filter_map(|c| c.id) {
                scheduler.remove_container(&application.id, id).await?;
            }
        }
        Ok(())
    }
}
