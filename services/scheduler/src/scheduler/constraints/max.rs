//! Replica ceiling.

use async_trait::async_trait;
use shipyard_reconcile::ReplicaDelta;
use tracing::info;

use super::{count, Constraint, DeployRequest};
use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{Application, Host};
use crate::scheduler::Scheduler;
use crate::store::keys;

pub(super) const NAME: &str = "max";

#[derive(Debug, Clone, Copy, Default)]
pub struct MaxConstraint;

#[async_trait]
impl Constraint for MaxConstraint {
    /// Fails fatally once the ceiling is met, unless the container being
    /// placed is already one of the stored replicas.
    async fn deploy(
        &self,
        scheduler: &Scheduler,
        request: &DeployRequest<'_>,
        hosts: Vec<Host>,
    ) -> SchedulerResult<Vec<Host>> {
        let max = count(&request.container.tags, NAME)?;
        let stored = scheduler.container_keys(request.application_name).await?;

        let is_stored = request
            .container
            .id
            .map(|id| keys::container(request.application_name, &id.to_string()))
            .is_some_and(|key| stored.contains(&key));

        if stored.len() > max || (stored.len() == max && !is_stored) {
            return Err(SchedulerError::ConstraintFatal {
                constraint: NAME.to_string(),
                reason: format!("{max} containers already exist"),
            });
        }
        Ok(hosts)
    }

    async fn harmonize(&self, scheduler: &Scheduler, application: &Application) -> SchedulerResult<()> {
        let max = count(&application.tags, NAME)?;
        let observed = scheduler.count_containers(&application.id).await?;

        if let ReplicaDelta::Remove(n) = ReplicaDelta::toward_ceiling(max, observed) {
            info!(application = %application.id, max, observed, remove = n, "Over replica ceiling");
            scheduler.remove_containers(&application.id, n).await?;
        }
        Ok(())
    }
}
