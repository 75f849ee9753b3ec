//! Placement pipeline.
//!
//! Filter stages run strictly in order and short-circuit on the first empty
//! result:
//!
//! ```text
//! live hosts ─► by_mode ─► by_tag ─► by_vacancy ─► by_constraints ─► uniform pick
//! ```
//!
//! A pinned container skips the filters and resolves its host directly.
//! Nothing is persisted here; callers commit the decision.

use std::collections::BTreeMap;

use rand::seq::IndexedRandom;
use tracing::{debug, instrument};

use super::constraints::DeployRequest;
use super::ports::PortRequest;
use super::vacancy::Resources;
use super::Scheduler;
use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{flatten_tags, Container, Host, Tags, CONSTRAINTS_TAG, METADATA_TAG};

/// Where and how a container will run.
#[derive(Debug, Clone)]
pub struct PlacementDecision {
    pub host: Host,
    pub host_port: u16,
    /// The host port was drawn from the range rather than requested.
    pub random_host_port: bool,
    pub env_vars: BTreeMap<String, String>,
}

/// Keep follower hosts.
pub fn filter_by_mode(hosts: Vec<Host>) -> SchedulerResult<Vec<Host>> {
    let followers: Vec<Host> = hosts.into_iter().filter(Host::is_follower).collect();
    if followers.is_empty() {
        return Err(SchedulerError::NoFollowerHosts);
    }
    Ok(followers)
}

/// Keep hosts whose flattened tags carry every requested tag value.
///
/// `constraints` and `metadata` are not matched against hosts.
pub fn filter_by_tag(hosts: Vec<Host>, tags: &Tags) -> SchedulerResult<Vec<Host>> {
    let mut wanted = tags.clone();
    wanted.remove(CONSTRAINTS_TAG);
    wanted.remove(METADATA_TAG);
    let wanted = flatten_tags(&wanted);

    let matched: Vec<Host> = hosts
        .into_iter()
        .filter(|host| {
            let have = host.flat_tags();
            wanted.iter().all(|(k, v)| have.get(k) == Some(v))
        })
        .collect();

    if matched.is_empty() {
        return Err(SchedulerError::NoTagMatch);
    }
    Ok(matched)
}

impl Scheduler {
    /// Choose a host and host port for a container.
    ///
    /// Filter failures are non-fatal and may be retried on the next
    /// harmonization pass; check [`SchedulerError::is_fatal`] before doing so.
    #[instrument(
        skip_all,
        fields(application = %application_name, container_id = ?container.id)
    )]
    pub async fn deploy(
        &self,
        application_name: &str,
        container: &Container,
    ) -> SchedulerResult<PlacementDecision> {
        let host = match container.pinned_host() {
            Some(id) => self
                .find_host(&id)
                .ok_or(SchedulerError::HostNotFound(id))?,
            None => self
                .find_available_host(application_name, container)
                .await
                .inspect_err(|e| debug!(error = %e, "No host available"))?,
        };

        let env_vars = self.resolve_env(application_name, container, &host).await?;
        let host_port = self.allocate_host_port(&host, container).await?;

        debug!(host = %host.id, host_port, "Placement decided");
        Ok(PlacementDecision {
            host,
            host_port,
            random_host_port: PortRequest::for_container(container).is_random(),
            env_vars,
        })
    }

    async fn find_available_host(
        &self,
        application_name: &str,
        container: &Container,
    ) -> SchedulerResult<Host> {
        let hosts = filter_by_mode(self.live_hosts(true))?;
        let hosts = filter_by_tag(hosts, &container.tags)?;
        let hosts = self
            .filter_by_vacancy(hosts, &Resources::of(container))
            .await?;

        let request = DeployRequest {
            application_name,
            container,
        };
        let hosts = self.constraints.enforce_deploy(self, &request, hosts).await?;

        hosts
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| SchedulerError::ConstraintUnmet {
                constraint: "by_constraints".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HostMode;
    use serde_json::json;
    use shipyard_id::HostId;

    fn host(id: &str, mode: HostMode, tags: serde_json::Value) -> Host {
        Host {
            id: HostId::new(id).unwrap(),
            host_name: None,
            mode,
            tags: tags.as_object().cloned().unwrap(),
            cpus: 1.0,
            memory: 0,
        }
    }

    fn tags(value: serde_json::Value) -> Tags {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_leader_is_never_a_candidate() {
        let hosts = vec![
            host("leader", HostMode::Leader, json!({})),
            host("f1", HostMode::Follower, json!({})),
        ];
        let followers = filter_by_mode(hosts).unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].id.as_str(), "f1");

        let only_leader = vec![host("leader", HostMode::Leader, json!({}))];
        assert!(matches!(
            filter_by_mode(only_leader),
            Err(SchedulerError::NoFollowerHosts)
        ));
    }

    #[test]
    fn test_tag_filter_matches_nested_values() {
        let hosts = vec![
            host("a", HostMode::Follower, json!({"rack": {"row": 1}, "ssd": true})),
            host("b", HostMode::Follower, json!({"rack": {"row": 2}, "ssd": true})),
        ];
        let wanted = tags(json!({
            "rack": {"row": 2},
            "constraints": {"max": 1},
            "metadata": {"owner": "ops"}
        }));

        let matched = filter_by_tag(hosts, &wanted).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id.as_str(), "b");
    }

    #[test]
    fn test_tag_filter_without_match() {
        let hosts = vec![host("a", HostMode::Follower, json!({"ssd": false}))];
        assert!(matches!(
            filter_by_tag(hosts, &tags(json!({"ssd": true}))),
            Err(SchedulerError::NoTagMatch)
        ));
    }

    #[test]
    fn test_empty_tags_keep_every_host() {
        let hosts = vec![
            host("a", HostMode::Follower, json!({})),
            host("b", HostMode::Follower, json!({"gpu": 1})),
        ];
        assert_eq!(filter_by_tag(hosts, &Tags::new()).unwrap().len(), 2);
    }
}
