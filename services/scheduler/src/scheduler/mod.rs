//! Leader-side placement and harmonization.
//!
//! The scheduler is responsible for:
//! - Picking a host and host port for each new container (placement)
//! - Enforcing the max/min/per_host/partition constraints
//! - Driving every application back toward its declared state (harmonization)
//!
//! Control flow:
//!
//! ```text
//! harmonize ─► constraint.harmonize ─► deploy_container / remove_containers
//!     │                                        │
//!     └── redeploy unloaded ──────────────► deploy (placement)
//!                                              ├─ by_mode, by_tag
//!                                              ├─ by_vacancy
//!                                              ├─ by_constraints
//!                                              └─ env defaults, host port
//! ```

mod applications;
pub mod constraints;
mod env;
mod harmonizer;
mod placement;
pub mod ports;
pub mod vacancy;
mod worker;

use std::collections::BTreeMap;
use std::sync::Arc;

use shipyard_id::{ContainerId, HostId};
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::engine::EngineRegistry;
use crate::error::{SchedulerError, SchedulerResult};
use crate::membership::Membership;
use crate::model::{Application, Container, Host};
use crate::store::{keys, KvStore, StoreError};

pub use applications::{ContainerOverrides, ContainerState};
pub use constraints::{Constraint, ConstraintRegistry, DeployRequest, RemoveRequest};
pub use harmonizer::{ApplicationStats, HarmonizeStats};
pub use placement::{filter_by_mode, filter_by_tag, PlacementDecision};
pub use worker::HarmonizationWorker;

/// A container record together with the key it was read from.
///
/// `container` is `None` when the stored value could not be parsed.
#[derive(Debug, Clone)]
pub struct ContainerEntry {
    pub key: String,
    pub container: Option<Container>,
}

/// The scheduler.
///
/// Holds no cluster state of its own: hosts come from membership and
/// applications/containers from the KV store on every call.
pub struct Scheduler {
    store: Arc<dyn KvStore>,
    membership: Arc<dyn Membership>,
    constraints: ConstraintRegistry,
    engines: EngineRegistry,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a scheduler with the built-in constraints and no engines.
    pub fn new(
        store: Arc<dyn KvStore>,
        membership: Arc<dyn Membership>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            membership,
            constraints: ConstraintRegistry::with_defaults(),
            engines: EngineRegistry::new(),
            config,
        }
    }

    pub fn with_constraints(mut self, constraints: ConstraintRegistry) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn constraints(&self) -> &ConstraintRegistry {
        &self.constraints
    }

    pub fn membership(&self) -> &dyn Membership {
        self.membership.as_ref()
    }

    // =========================================================================
    // Hosts
    // =========================================================================

    /// Peers plus, optionally, this node.
    pub fn live_hosts(&self, include_self: bool) -> Vec<Host> {
        let mut hosts = self.membership.peers();
        if include_self {
            hosts.push(self.membership.attributes());
        }
        hosts
    }

    pub fn find_host(&self, id: &HostId) -> Option<Host> {
        self.live_hosts(true).into_iter().find(|h| &h.id == id)
    }

    // =========================================================================
    // Applications
    // =========================================================================

    pub async fn list_application_names(&self) -> SchedulerResult<Vec<String>> {
        let keys = self.store.keys(&keys::applications()).await?;
        Ok(keys
            .iter()
            .map(|k| keys::last_segment(k).to_string())
            .collect())
    }

    pub async fn get_application(&self, name: &str) -> SchedulerResult<Application> {
        let key = keys::application(name);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw,
            Err(StoreError::NotFound(_)) => {
                return Err(SchedulerError::ApplicationNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&raw).map_err(|source| SchedulerError::CorruptRecord { key, source })
    }

    pub async fn put_application(&self, application: &Application) -> SchedulerResult<()> {
        if !keys::is_valid_name(&application.id) {
            return Err(SchedulerError::InvalidName(application.id.clone()));
        }
        let value = serde_json::to_string(application)?;
        self.store
            .set(&keys::application(&application.id), value)
            .await?;
        Ok(())
    }

    /// Every parseable application. Corrupt records are skipped.
    pub async fn list_applications(&self) -> SchedulerResult<Vec<Application>> {
        let mut applications = Vec::new();
        for name in self.list_application_names().await? {
            match self.get_application(&name).await {
                Ok(app) => applications.push(app),
                Err(e) => debug!(application = %name, error = %e, "Skipping application"),
            }
        }
        Ok(applications)
    }

    pub async fn list_variables(&self) -> SchedulerResult<BTreeMap<String, String>> {
        let mut variables = BTreeMap::new();
        for key in self.store.keys(&keys::variables()).await? {
            if let Ok(value) = self.store.get(&key).await {
                variables.insert(keys::last_segment(&key).to_string(), value);
            }
        }
        Ok(variables)
    }

    pub async fn put_variable(&self, name: &str, value: &str) -> SchedulerResult<()> {
        if !keys::is_valid_name(name) {
            return Err(SchedulerError::InvalidName(name.to_string()));
        }
        self.store
            .set(&keys::variable(name), value.to_string())
            .await?;
        Ok(())
    }

    // =========================================================================
    // Containers
    // =========================================================================

    async fn read_entries(&self, pattern: &str) -> SchedulerResult<Vec<ContainerEntry>> {
        let mut entries = Vec::new();
        for key in self.store.keys(pattern).await? {
            // Deleted between listing and reading.
            let Ok(raw) = self.store.get(&key).await else {
                continue;
            };

            let container = match serde_json::from_str::<Container>(&raw) {
                Ok(c) => Some(c),
                Err(e) => {
                    debug!(key = %key, error = %e, "Unparseable container record");
                    None
                }
            };
            entries.push(ContainerEntry { key, container });
        }
        Ok(entries)
    }

    /// Container records of one application, keeping their storage keys.
    pub async fn container_entries(&self, application: &str) -> SchedulerResult<Vec<ContainerEntry>> {
        self.read_entries(&keys::containers(application)).await
    }

    /// Parseable containers of one application.
    pub async fn get_containers(&self, application: &str) -> SchedulerResult<Vec<Container>> {
        Ok(self
            .container_entries(application)
            .await?
            .into_iter()
            .filter_map(|e| e.container)
            .collect())
    }

    /// Parseable containers across every application.
    pub async fn get_all_containers(&self) -> SchedulerResult<Vec<Container>> {
        Ok(self
            .read_entries(&keys::all_containers())
            .await?
            .into_iter()
            .filter_map(|e| e.container)
            .collect())
    }

    /// Keys of every stored record for an application, parseable or not.
    pub async fn container_keys(&self, application: &str) -> SchedulerResult<Vec<String>> {
        Ok(self.store.keys(&keys::containers(application)).await?)
    }

    pub async fn count_containers(&self, application: &str) -> SchedulerResult<usize> {
        Ok(self.container_keys(application).await?.len())
    }

    pub async fn get_container(
        &self,
        application: &str,
        id: ContainerId,
    ) -> SchedulerResult<Container> {
        let key = keys::container(application, &id.to_string());
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw,
            Err(StoreError::NotFound(_)) => {
                return Err(SchedulerError::ContainerNotFound {
                    application: application.to_string(),
                    container_id: id,
                })
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&raw).map_err(|source| SchedulerError::CorruptRecord { key, source })
    }

    pub async fn put_container(&self, application: &str, container: &Container) -> SchedulerResult<()> {
        let id = container.id.map(|id| id.to_string()).unwrap_or_default();
        let value = serde_json::to_string(container)?;
        self.store
            .set(&keys::container(application, &id), value)
            .await?;
        Ok(())
    }

    pub async fn delete_container(&self, application: &str, id: ContainerId) -> SchedulerResult<()> {
        self.store
            .delete(&keys::container(application, &id.to_string()))
            .await?;
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> SchedulerResult<()> {
        self.store.delete(key).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("constraints", &self.constraints.names())
            .field("engines", &self.engines)
            .field("config", &self.config)
            .finish()
    }
}
