//! Cluster description for single-process runs.
//!
//! ```json
//! {
//!   "local": {"id": "leader-0", "mode": "leader", "cpus": 1, "memory": 1073741824},
//!   "peers": [{"id": "node-1", "mode": "follower", "cpus": 4, "memory": 8589934592}],
//!   "applications": [{"id": "web", "cpus": 0.5, "memory": 256, "tags": {"constraints": {"min": 2}}}],
//!   "variables": {"region": "eu-west"}
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::membership::StaticMembership;
use crate::model::{Application, Container, Host};
use crate::Scheduler;

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSeed {
    /// This node.
    pub local: Host,

    #[serde(default)]
    pub peers: Vec<Host>,

    #[serde(default)]
    pub applications: Vec<Application>,

    /// Existing container records, e.g. to replay a cluster snapshot.
    #[serde(default)]
    pub containers: Vec<Container>,

    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl ClusterSeed {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read cluster file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid cluster file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn membership(&self) -> StaticMembership {
        StaticMembership::new(self.local.clone(), self.peers.clone())
    }

    /// Write applications, containers, and variables through the scheduler.
    pub async fn populate(&self, scheduler: &Scheduler) -> Result<()> {
        for application in &self.applications {
            scheduler.put_application(application).await?;
        }
        for container in &self.containers {
            scheduler
                .put_container(&container.application_name, container)
                .await?;
        }
        for (name, value) in &self.variables {
            scheduler.put_variable(name, value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HostMode;

    #[test]
    fn test_parse_minimal_seed() {
        let seed = ClusterSeed::parse(
            r#"{"local": {"id": "leader-0", "mode": "leader", "cpus": 1, "memory": 1024}}"#,
        )
        .unwrap();

        assert_eq!(seed.local.mode, HostMode::Leader);
        assert!(seed.peers.is_empty());
        assert!(seed.applications.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_local() {
        assert!(ClusterSeed::parse(r#"{"peers": []}"#).is_err());
    }
}
