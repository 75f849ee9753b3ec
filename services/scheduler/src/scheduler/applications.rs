//! Container lifecycle operations.
//!
//! These are the callers of placement: they build container records,
//! commit placement decisions, and hand committed records to an engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use shipyard_id::{ContainerId, HostId};
use shipyard_reconcile::order_for_removal;
use tracing::{error, info, instrument, warn};

use super::constraints::RemoveRequest;
use super::Scheduler;
use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{Application, Container, ContainerStatus, Tags};

/// Per-container overrides of the application template.
#[derive(Debug, Clone, Default)]
pub struct ContainerOverrides {
    /// Merged over the application's tags, e.g. `{"host": "..."}` to pin.
    pub tags: Tags,
    pub host_port: Option<u16>,
    pub container_port: Option<u16>,
    pub cpus: Option<f64>,
    /// MiB.
    pub memory: Option<u64>,
    pub env_vars: BTreeMap<String, String>,
}

/// State reported for a container by its runtime.
#[derive(Debug, Clone)]
pub struct ContainerState {
    pub status: ContainerStatus,
    pub host: Option<HostId>,
    pub host_port: Option<u16>,
    pub start_time: Option<DateTime<Utc>>,
    /// `false` removes the record instead of updating it.
    pub respawn: bool,
}

impl ContainerState {
    pub fn unloaded() -> Self {
        Self {
            status: ContainerStatus::Unloaded,
            host: None,
            host_port: None,
            start_time: None,
            respawn: true,
        }
    }

    fn apply(self, container: &mut Container) {
        container.status = self.status;
        container.host = self.host;
        container.start_time = self.start_time;
        if self.host_port.is_some() {
            container.host_port = self.host_port;
        }
        if self.status == ContainerStatus::Unloaded && container.random_host_port {
            container.host_port = None;
        }
    }
}

/// Fresh unplaced container for `application`.
pub(crate) fn container_from_template(application: &Application, overrides: ContainerOverrides) -> Container {
    let mut tags = application.tags.clone();
    tags.extend(overrides.tags);

    let mut env_vars = application.env_vars.clone();
    env_vars.extend(overrides.env_vars);

    Container {
        id: Some(ContainerId::new()),
        application_name: application.id.clone(),
        status: ContainerStatus::Unloaded,
        host: None,
        host_port: overrides.host_port,
        container_port: overrides.container_port.or(application.container_port),
        cpus: overrides.cpus.unwrap_or(application.cpus),
        memory: overrides.memory.unwrap_or(application.memory),
        tags,
        start_time: None,
        engine: application.engine.clone(),
        random_host_port: false,
        network_mode: application.network_mode.clone(),
        image: application.image.clone(),
        command: application.command.clone(),
        env_vars,
        volumes: application.volumes.clone(),
        respawn: application.respawn,
    }
}

impl Scheduler {
    /// Create and place one new container.
    ///
    /// On a non-fatal placement failure the container is still stored as
    /// `unloaded` so the next harmonization pass retries it. A fatal failure
    /// stores nothing.
    #[instrument(skip(self, overrides))]
    pub async fn deploy_container(
        &self,
        application_name: &str,
        overrides: ContainerOverrides,
    ) -> SchedulerResult<Container> {
        let application = self.get_application(application_name).await?;
        let container = container_from_template(&application, overrides);
        self.place_and_commit(application_name, container).await
    }

    /// Place an existing, unloaded container record again.
    pub async fn redeploy(&self, application_name: &str, mut container: Container) -> SchedulerResult<Container> {
        container.host = None;
        container.start_time = None;
        if container.random_host_port {
            container.host_port = None;
        }
        self.place_and_commit(application_name, container).await
    }

    async fn place_and_commit(&self, application_name: &str, mut container: Container) -> SchedulerResult<Container> {
        let decision = match self.deploy(application_name, &container).await {
            Ok(decision) => decision,
            Err(e) if e.is_fatal() => {
                warn!(application = %application_name, error = %e, "Placement rejected");
                return Err(e);
            }
            Err(e) => {
                container.status = ContainerStatus::Unloaded;
                self.put_container(application_name, &container).await?;
                return Err(e);
            }
        };

        container.status = ContainerStatus::Loading;
        container.host = Some(decision.host.id.clone());
        container.host_port = Some(decision.host_port);
        container.random_host_port = decision.random_host_port;
        container.env_vars = decision.env_vars;
        self.put_container(application_name, &container).await?;

        info!(
            application = %application_name,
            container_id = ?container.id,
            host = %decision.host.id,
            host_port = decision.host_port,
            "Container placed"
        );

        self.start_container(application_name, container).await
    }

    async fn start_container(&self, application_name: &str, mut container: Container) -> SchedulerResult<Container> {
        let failure = match self.engines.get(&container.engine) {
            None => SchedulerError::EngineNotFound(container.engine.clone()),
            Some(engine) => {
                let started = engine.start(&container).await;
                match started {
                    Ok(()) => return Ok(container),
                    Err(e) => SchedulerError::Engine(e.to_string()),
                }
            }
        };

        error!(
            application = %application_name,
            container_id = ?container.id,
            engine = %container.engine,
            error = %failure,
            "Failed to start container"
        );
        ContainerState::unloaded().apply(&mut container);
        self.put_container(application_name, &container).await?;
        Err(failure)
    }

    /// Pick up to `count` containers to remove, without removing them.
    ///
    /// When `count` covers every container, all are returned and the
    /// constraint `remove` hooks (including the `min` floor) are skipped.
    pub async fn select_removals(&self, application_name: &str, count: usize) -> SchedulerResult<Vec<ContainerId>> {
        let containers = self.get_containers(application_name).await?;
        if containers.len() <= count {
            return Ok(containers.iter().filter_map(|c| c.id).collect());
        }

        let application = self.get_application(application_name).await?;
        let request = RemoveRequest {
            application: &application,
            requested: count,
            total: containers.len(),
        };
        let candidates = self
            .constraints
            .enforce_remove(self, &request, containers)
            .await?;

        Ok(order_for_removal(candidates, |c| c.status.removal_priority())
            .into_iter()
            .filter_map(|c| c.id)
            .take(count)
            .collect())
    }

    /// Scale an application down by up to `count` containers.
    #[instrument(skip(self))]
    pub async fn remove_containers(&self, application_name: &str, count: usize) -> SchedulerResult<Vec<ContainerId>> {
        let victims = self.select_removals(application_name, count).await?;
        for id in &victims {
            self.remove_container(application_name, *id).await?;
        }

        info!(application = %application_name, removed = victims.len(), "Removed containers");
        Ok(victims)
    }

    /// Stop a container and delete its record.
    pub async fn remove_container(&self, application_name: &str, id: ContainerId) -> SchedulerResult<()> {
        match self.get_container(application_name, id).await {
            Ok(container) => self.stop_container(&container).await,
            Err(SchedulerError::ContainerNotFound { .. } | SchedulerError::CorruptRecord { .. }) => {}
            Err(e) => return Err(e),
        }

        self.delete_container(application_name, id).await
    }

    pub(super) async fn stop_container(&self, container: &Container) {
        let Some(engine) = self.engines.get(&container.engine) else {
            warn!(container_id = ?container.id, engine = %container.engine, "No engine to stop container");
            return;
        };

        if container.host.is_some() {
            if let Err(e) = engine.stop(container).await {
                warn!(container_id = ?container.id, error = %e, "Failed to stop container");
            }
        }
    }

    /// Record state reported by a runtime.
    pub async fn update_container_state(
        &self,
        application_name: &str,
        id: ContainerId,
        state: ContainerState,
    ) -> SchedulerResult<()> {
        if !state.respawn {
            return self.delete_container(application_name, id).await;
        }

        let mut container = self.get_container(application_name, id).await?;
        state.apply(&mut container);
        self.put_container(application_name, &container).await
    }

    /// Force a container back to `unloaded`.
    pub async fn unload_container(&self, application_name: &str, id: ContainerId) -> SchedulerResult<()> {
        self.update_container_state(application_name, id, ContainerState::unloaded())
            .await
            .inspect_err(|e| {
                warn!(application = %application_name, container_id = %id, error = %e, "Failed to unload container");
            })
    }

    /// Force every container of an application back to `unloaded`.
    pub async fn unload_containers(&self, application_name: &str) -> SchedulerResult<()> {
        for container in self.get_containers(application_name).await? {
            if let Some(id) = container.id {
                self.unload_container(application_name, id).await?;
            }
        }
        Ok(())
    }

    /// Replace a container that failed its health checks.
    #[instrument(skip(self))]
    pub async fn redeploy_container(&self, application_name: &str, id: ContainerId) -> SchedulerResult<Container> {
        let container = self.get_container(application_name, id).await?;
        self.stop_container(&container).await;
        self.unload_container(application_name, id).await?;

        let container = self.get_container(application_name, id).await?;
        self.redeploy(application_name, container).await
    }
}
