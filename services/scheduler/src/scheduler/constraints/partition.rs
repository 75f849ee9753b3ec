//! Even spread across the values of a host tag.

use std::collections::HashMap;

use async_trait::async_trait;
use shipyard_id::HostId;
use shipyard_reconcile::{largest_group_first, order_for_removal};

use super::{tag_name, Constraint, DeployRequest, RemoveRequest};
use crate::error::SchedulerResult;
use crate::model::{tag_key, Container, ContainerStatus, Host};
use crate::scheduler::Scheduler;

pub(super) const NAME: &str = "partition";

#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionConstraint;

fn partition_of(host: &Host, partition: &str) -> Option<String> {
    host.flat_tags().get(partition).map(tag_key)
}

/// Candidates in the partition value with the fewest placed containers.
///
/// Values are visited in order of first appearance among `candidates` and
/// the first minimum wins. Hosts without the tag are dropped.
fn least_loaded(candidates: Vec<Host>, partition: &str, fleet: &[Host], containers: &[Container]) -> Vec<Host> {
    let mut groups: Vec<(String, Vec<Host>)> = Vec::new();
    for host in candidates {
        let Some(value) = partition_of(&host, partition) else {
            continue;
        };
        match groups.iter_mut().find(|(v, _)| *v == value) {
            Some((_, hosts)) => hosts.push(host),
            None => groups.push((value, vec![host])),
        }
    }

    let value_of: HashMap<&HostId, String> = fleet
        .iter()
        .filter_map(|h| partition_of(h, partition).map(|v| (&h.id, v)))
        .collect();

    let mut placed: HashMap<&str, usize> = HashMap::new();
    for container in containers.iter().filter(|c| c.status != ContainerStatus::Unloaded) {
        if let Some(value) = container.host.as_ref().and_then(|h| value_of.get(h)) {
            *placed.entry(value.as_str()).or_default() += 1;
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for (i, (value, _)) in groups.iter().enumerate() {
        let n = placed.get(value.as_str()).copied().unwrap_or(0);
        if best.map_or(true, |(_, min)| n < min) {
            best = Some((i, n));
        }
    }

    match best {
        Some((i, _)) => groups.swap_remove(i).1,
        None => Vec::new(),
    }
}

/// Removal order that keeps partition values balanced.
///
/// Unplaced containers and those on unknown hosts share one group.
fn balanced_removal_order(candidates: Vec<Container>, partition: &str, fleet: &[Host]) -> Vec<Container> {
    let value_of: HashMap<&HostId, String> = fleet
        .iter()
        .filter_map(|h| partition_of(h, partition).map(|v| (&h.id, v)))
        .collect();

    let mut groups: Vec<(Option<String>, Vec<Container>)> = Vec::new();
    for container in candidates {
        let value = container.host.as_ref().and_then(|h| value_of.get(h)).cloned();
        match groups.iter_mut().find(|(v, _)| *v == value) {
            Some((_, members)) => members.push(container),
            None => groups.push((value, vec![container])),
        }
    }

    largest_group_first(
        groups
            .into_iter()
            .map(|(_, members)| order_for_removal(members, |c| c.status.removal_priority()))
            .collect(),
    )
}

#[async_trait]
impl Constraint for PartitionConstraint {
    async fn deploy(
        &self,
        scheduler: &Scheduler,
        request: &DeployRequest<'_>,
        hosts: Vec<Host>,
    ) -> SchedulerResult<Vec<Host>> {
        let partition = tag_name(&request.container.tags, NAME)?;
        let containers = scheduler.get_containers(request.application_name).await?;
        let fleet = scheduler.live_hosts(true);

        Ok(least_loaded(hosts, &partition, &fleet, &containers))
    }

    async fn remove(
        &self,
        scheduler: &Scheduler,
        request: &RemoveRequest<'_>,
        candidates: Vec<Container>,
    ) -> SchedulerResult<Vec<Container>> {
        let partition = tag_name(&request.application.tags, NAME)?;
        let fleet = scheduler.live_hosts(true);

        Ok(balanced_removal_order(candidates, &partition, &fleet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HostMode, Tags};
    use serde_json::json;

    fn host(id: &str, rack: Option<&str>) -> Host {
        let mut tags = Tags::new();
        if let Some(rack) = rack {
            tags.insert("location".to_string(), json!({"rack": rack}));
        }
        Host {
            id: HostId::new(id).unwrap(),
            host_name: None,
            mode: HostMode::Follower,
            tags,
            cpus: 1.0,
            memory: 0,
        }
    }

    fn on(host: &str, status: &str) -> Container {
        serde_json::from_value(json!({
            "id": shipyard_id::ContainerId::new(),
            "host": host,
            "status": status
        }))
        .unwrap()
    }

    fn ids(hosts: &[Host]) -> Vec<&str> {
        hosts.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn test_deploy_targets_emptiest_value() {
        let fleet = vec![host("a1", Some("a")), host("a2", Some("a")), host("b1", Some("b"))];
        let containers = vec![on("a1", "loaded"), on("b1", "loaded"), on("b1", "loading")];

        let chosen = least_loaded(fleet.clone(), "location.rack", &fleet, &containers);
        assert_eq!(ids(&chosen), vec!["a1", "a2"]);
    }

    #[test]
    fn test_deploy_ignores_unloaded_and_breaks_ties_by_first_value() {
        let fleet = vec![host("b1", Some("b")), host("a1", Some("a"))];
        let containers = vec![on("b1", "unloaded"), on("b1", "unloaded")];

        let chosen = least_loaded(fleet.clone(), "location.rack", &fleet, &containers);
        assert_eq!(ids(&chosen), vec!["b1"]);
    }

    #[test]
    fn test_hosts_without_partition_tag_are_excluded() {
        let fleet = vec![host("x", None)];
        assert!(least_loaded(fleet.clone(), "location.rack", &fleet, &[]).is_empty());
    }

    #[test]
    fn test_removal_drains_largest_partition_first() {
        let fleet = vec![host("a1", Some("a")), host("b1", Some("b"))];
        let candidates = vec![
            on("a1", "loaded"),
            on("b1", "loaded"),
            on("b1", "loaded"),
            on("b1", "loading"),
        ];

        let order = balanced_removal_order(candidates, "location.rack", &fleet);
        let hosts: Vec<&str> = order
            .iter()
            .map(|c| c.host.as_ref().unwrap().as_str())
            .collect();

        assert_eq!(hosts, vec!["b1", "b1", "a1", "b1"]);
        assert_eq!(order[0].status, ContainerStatus::Loading);
    }
}
