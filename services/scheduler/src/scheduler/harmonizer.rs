//! Harmonization: drive every application back toward its declared state.
//!
//! Per application:
//! 1. Run each active constraint's `harmonize` hook
//! 2. Repair records (stop and delete corrupt ones, unload orphans)
//! 3. Redeploy every `unloaded` container
//!
//! Applications are harmonized concurrently and never block each other.

use futures_util::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use super::applications::ContainerState;
use super::Scheduler;
use crate::error::SchedulerResult;
use crate::model::ContainerStatus;

/// Statistics from a harmonization pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarmonizeStats {
    pub applications_processed: usize,
    pub applications_failed: usize,
    pub orphans_repaired: usize,
    pub corrupt_removed: usize,
    pub redeployed: usize,
    pub redeploy_failed: usize,
}

impl HarmonizeStats {
    fn add(&mut self, app: &ApplicationStats) {
        self.applications_processed += 1;
        self.orphans_repaired += app.orphans_repaired;
        self.corrupt_removed += app.corrupt_removed;
        self.redeployed += app.redeployed;
        self.redeploy_failed += app.redeploy_failed;
    }

    /// Whether the pass changed anything.
    pub fn is_quiet(&self) -> bool {
        self.orphans_repaired == 0 && self.corrupt_removed == 0 && self.redeployed == 0
    }
}

/// Statistics from harmonizing a single application.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplicationStats {
    pub orphans_repaired: usize,
    pub corrupt_removed: usize,
    pub redeployed: usize,
    pub redeploy_failed: usize,
}

impl Scheduler {
    /// Run one harmonization pass over every application.
    #[instrument(skip(self))]
    pub async fn harmonize(&self) -> SchedulerResult<HarmonizeStats> {
        let names = self.list_application_names().await?;
        debug!(application_count = names.len(), "Found applications to harmonize");

        let results = join_all(names.iter().map(|name| self.harmonize_application(name))).await;

        let mut stats = HarmonizeStats::default();
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(app_stats) => stats.add(&app_stats),
                Err(e) => {
                    error!(application = %name, error = %e, "Failed to run harmonization");
                    stats.applications_failed += 1;
                }
            }
        }

        info!(
            applications_processed = stats.applications_processed,
            applications_failed = stats.applications_failed,
            orphans_repaired = stats.orphans_repaired,
            corrupt_removed = stats.corrupt_removed,
            redeployed = stats.redeployed,
            redeploy_failed = stats.redeploy_failed,
            "Harmonization pass complete"
        );

        Ok(stats)
    }

    /// Harmonize a single application.
    ///
    /// A failing constraint hook aborts this application for the pass.
    pub async fn harmonize_application(&self, application_name: &str) -> SchedulerResult<ApplicationStats> {
        let application = self.get_application(application_name).await?;
        let mut stats = ApplicationStats::default();

        for (name, constraint) in self.constraints.active_for(&application.tags) {
            constraint
                .harmonize(self, &application)
                .await
                .inspect_err(|e| warn!(application = %application_name, constraint = name, error = %e, "Constraint harmonize failed"))?;
        }

        let mut unload_all = false;
        for entry in self.container_entries(application_name).await? {
            let Some(container) = entry.container else {
                warn!(key = %entry.key, "Removing unparseable container record");
                self.delete_key(&entry.key).await?;
                stats.corrupt_removed += 1;
                continue;
            };

            let Some(id) = container.id else {
                warn!(key = %entry.key, host = ?container.host, "Removing container record without an id");
                self.stop_container(&container).await;
                self.delete_key(&entry.key).await?;
                stats.corrupt_removed += 1;
                unload_all |= container.status == ContainerStatus::Loaded;
                continue;
            };

            if container.is_orphaned() {
                info!(application = %application_name, container_id = %id, "Unloading orphaned container");
                self.update_container_state(application_name, id, ContainerState::unloaded())
                    .await?;
                stats.orphans_repaired += 1;
            }
        }

        if unload_all {
            self.unload_containers(application_name).await?;
        }

        let unloaded: Vec<_> = self
            .get_containers(application_name)
            .await?
            .into_iter()
            .filter(|c| c.id.is_some() && c.status == ContainerStatus::Unloaded)
            .collect();

        if !unloaded.is_empty() {
            info!(
                application = %application_name,
                count = unloaded.len(),
                "Attempting to replace unloaded containers"
            );
        }

        for container in unloaded {
            let id = container.id;
            match self.redeploy(application_name, container).await {
                Ok(_) => stats.redeployed += 1,
                Err(e) => {
                    warn!(application = %application_name, container_id = ?id, error = %e, "Redeploy failed");
                    stats.redeploy_failed += 1;
                }
            }
        }

        Ok(stats)
    }
}
