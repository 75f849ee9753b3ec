//! `CS_*` environment defaults injected into every placed container.

use std::collections::BTreeMap;

use tracing::debug;

use super::Scheduler;
use crate::error::SchedulerResult;
use crate::model::{Application, Container, Host};

const PREFIX: &str = "CS_";

/// Drop every scheduler-owned variable.
pub(crate) fn clear_defaults(env: &mut BTreeMap<String, String>) {
    env.retain(|name, _| !name.starts_with(PREFIX));
}

/// Container and host identity plus cluster-wide discovery addresses.
pub(crate) fn defaults(
    container: &Container,
    application_name: &str,
    host: &Host,
    cluster_id: &str,
    applications: &[Application],
    variables: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let host_name = host.host_name.clone().unwrap_or_default();
    let mut env = BTreeMap::from([
        (
            "CS_CONTAINER_ID".to_string(),
            container.id.map(|id| id.to_string()).unwrap_or_default(),
        ),
        ("CS_APPLICATION".to_string(), application_name.to_string()),
        ("CS_CLUSTER_ID".to_string(), cluster_id.to_string()),
        ("CS_FOLLOWER_HOST_ID".to_string(), host.id.to_string()),
        ("CS_FOLLOWER_HOSTNAME".to_string(), host_name.clone()),
        ("CS_FOLLOWER_HOST_NAME".to_string(), host_name),
    ]);

    for app in applications {
        let upper = app.id.to_uppercase();
        if let Some(port) = app.discovery_port {
            env.insert(format!("CS_DISCOVERY_PORT_{upper}"), port.to_string());
        }
        env.insert(
            format!("CS_ADDRESS_{upper}"),
            format!("{}.{cluster_id}.containership", app.id),
        );
    }

    for (name, value) in variables {
        env.insert(format!("CS_VARIABLE_{}", name.to_uppercase()), value.clone());
    }

    env
}

impl Scheduler {
    /// The container's env vars with fresh defaults for `host`.
    pub(crate) async fn resolve_env(
        &self,
        application_name: &str,
        container: &Container,
        host: &Host,
    ) -> SchedulerResult<BTreeMap<String, String>> {
        let applications = self.list_applications().await?;
        let variables = self.list_variables().await?;

        let mut env = container.env_vars.clone();
        clear_defaults(&mut env);
        env.extend(defaults(
            container,
            application_name,
            host,
            &self.config().cluster_id,
            &applications,
            &variables,
        ));

        debug!(
            application = %application_name,
            host = %host.id,
            count = env.len(),
            "Resolved environment"
        );
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HostMode, Tags};
    use shipyard_id::{ContainerId, HostId};

    #[test]
    fn test_defaults_replace_stale_values() {
        let id = ContainerId::new();
        let container: Container = serde_json::from_value(serde_json::json!({
            "id": id,
            "env_vars": {"CS_FOLLOWER_HOST_ID": "old", "CS_GONE": "1", "PORT": "80"}
        }))
        .unwrap();
        let host = Host {
            id: HostId::new("host-a").unwrap(),
            host_name: Some("node-a".to_string()),
            mode: HostMode::Follower,
            tags: Tags::new(),
            cpus: 1.0,
            memory: 0,
        };
        let mut db = Application::new("db", 0.1, 64);
        db.discovery_port = Some(10001);
        let variables = BTreeMap::from([("region".to_string(), "eu".to_string())]);

        let mut env = container.env_vars.clone();
        clear_defaults(&mut env);
        env.extend(defaults(&container, "web", &host, "c1", &[db], &variables));

        assert_eq!(env["PORT"], "80");
        assert!(!env.contains_key("CS_GONE"));
        assert_eq!(env["CS_CONTAINER_ID"], id.to_string());
        assert_eq!(env["CS_APPLICATION"], "web");
        assert_eq!(env["CS_FOLLOWER_HOST_ID"], "host-a");
        assert_eq!(env["CS_FOLLOWER_HOSTNAME"], "node-a");
        assert_eq!(env["CS_DISCOVERY_PORT_DB"], "10001");
        assert_eq!(env["CS_ADDRESS_DB"], "db.c1.containership");
        assert_eq!(env["CS_VARIABLE_REGION"], "eu");
    }
}
