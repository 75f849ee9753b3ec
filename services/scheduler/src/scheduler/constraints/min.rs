//! Replica floor.

use async_trait::async_trait;
use shipyard_reconcile::{order_for_removal, ReplicaDelta};
use tracing::{info, warn};

use super::{count, Constraint, RemoveRequest};
use crate::error::SchedulerResult;
use crate::model::{Application, Container};
use crate::scheduler::{ContainerOverrides, Scheduler};

pub(super) const NAME: &str = "min";

#[derive(Debug, Clone, Copy, Default)]
pub struct MinConstraint;

/// How many of `request.requested` may go without crossing `min`.
fn allowed_removals(request: &RemoveRequest<'_>, min: usize) -> usize {
    if request.total.saturating_sub(request.requested) < min {
        request.total.saturating_sub(min)
    } else {
        request.requested
    }
}

#[async_trait]
impl Constraint for MinConstraint {
    async fn remove(
        &self,
        _scheduler: &Scheduler,
        request: &RemoveRequest<'_>,
        candidates: Vec<Container>,
    ) -> SchedulerResult<Vec<Container>> {
        let min = count(&request.application.tags, NAME)?;
        let allowed = allowed_removals(request, min);

        let mut ordered = order_for_removal(candidates, |c| c.status.removal_priority());
        ordered.truncate(allowed);
        Ok(ordered)
    }

    /// Deploy replicas until the floor is met. Individual placement failures
    /// leave unloaded records behind for the redeploy step.
    async fn harmonize(&self, scheduler: &Scheduler, application: &Application) -> SchedulerResult<()> {
        let min = count(&application.tags, NAME)?;
        let observed = scheduler.count_containers(&application.id).await?;

        if let ReplicaDelta::Add(n) = ReplicaDelta::toward_floor(min, observed) {
            info!(application = %application.id, min, observed, add = n, "Under replica floor");
            for _ in 0..n {
                if let Err(e) = scheduler
                    .deploy_container(&application.id, ContainerOverrides::default())
                    .await
                {
                    warn!(application = %application.id, error = %e, "Failed to deploy container");
                }
            }
        }
        Ok(())
    }
}
