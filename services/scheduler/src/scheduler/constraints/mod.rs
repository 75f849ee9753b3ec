//! Named placement and scale policies.
//!
//! A constraint is active for a container or application when its name is a
//! key of `tags.constraints`. Unknown names are ignored.
//!
//! Every hook is idempotent and tolerates stale inputs: state is re-read from
//! the store on each call.

mod max;
mod min;
mod partition;
mod per_host;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

pub use max::MaxConstraint;
pub use min::MinConstraint;
pub use partition::PartitionConstraint;
pub use per_host::PerHostConstraint;

use super::Scheduler;
use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{constraints_of, Application, Container, Host, Tags};

/// Placement of a single container.
#[derive(Debug, Clone, Copy)]
pub struct DeployRequest<'a> {
    pub application_name: &'a str,
    pub container: &'a Container,
}

/// A scale-down of an application.
#[derive(Debug, Clone, Copy)]
pub struct RemoveRequest<'a> {
    pub application: &'a Application,
    /// Containers asked to be removed.
    pub requested: usize,
    /// Containers the application had when selection started.
    pub total: usize,
}

/// A placement/scale policy.
#[async_trait]
pub trait Constraint: Send + Sync {
    /// Narrow the candidate hosts for one new container.
    async fn deploy(
        &self,
        _scheduler: &Scheduler,
        _request: &DeployRequest<'_>,
        hosts: Vec<Host>,
    ) -> SchedulerResult<Vec<Host>> {
        Ok(hosts)
    }

    /// Narrow or reorder removal candidates, first to remove first.
    async fn remove(
        &self,
        _scheduler: &Scheduler,
        _request: &RemoveRequest<'_>,
        candidates: Vec<Container>,
    ) -> SchedulerResult<Vec<Container>> {
        Ok(candidates)
    }

    /// Move the application toward this policy across the cluster.
    async fn harmonize(&self, _scheduler: &Scheduler, _application: &Application) -> SchedulerResult<()> {
        Ok(())
    }
}

/// Ordered map from constraint name to strategy.
#[derive(Clone, Default)]
pub struct ConstraintRegistry {
    constraints: Vec<(String, Arc<dyn Constraint>)>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max`, `min`, `partition`, and `per_host`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(max::NAME, Arc::new(MaxConstraint));
        registry.register(min::NAME, Arc::new(MinConstraint));
        registry.register(partition::NAME, Arc::new(PartitionConstraint));
        registry.register(per_host::NAME, Arc::new(PerHostConstraint));
        registry
    }

    /// Add a strategy, replacing any registered under the same name.
    pub fn register(&mut self, name: impl Into<String>, constraint: Arc<dyn Constraint>) {
        let name = name.into();
        match self.constraints.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = constraint,
            None => self.constraints.push((name, constraint)),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.constraints.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Constraint>> {
        self.constraints
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| Arc::clone(c))
    }

    /// Strategies named in `tags.constraints`, in registration order.
    pub fn active_for(&self, tags: &Tags) -> Vec<(&str, Arc<dyn Constraint>)> {
        let Some(named) = constraints_of(tags) else {
            return Vec::new();
        };

        self.constraints
            .iter()
            .filter(|(n, _)| named.contains_key(n))
            .map(|(n, c)| (n.as_str(), Arc::clone(c)))
            .collect()
    }

    /// Run every active `deploy` hook in series.
    pub async fn enforce_deploy(
        &self,
        scheduler: &Scheduler,
        request: &DeployRequest<'_>,
        mut hosts: Vec<Host>,
    ) -> SchedulerResult<Vec<Host>> {
        for (name, constraint) in self.active_for(&request.container.tags) {
            hosts = constraint.deploy(scheduler, request, hosts).await?;
            debug!(constraint = name, remaining = hosts.len(), "Constraint applied");

            if hosts.is_empty() {
                return Err(SchedulerError::ConstraintUnmet {
                    constraint: name.to_string(),
                });
            }
        }
        Ok(hosts)
    }

    /// Run every active `remove` hook in series.
    pub async fn enforce_remove(
        &self,
        scheduler: &Scheduler,
        request: &RemoveRequest<'_>,
        mut candidates: Vec<Container>,
    ) -> SchedulerResult<Vec<Container>> {
        for (name, constraint) in self.active_for(&request.application.tags) {
            candidates = constraint.remove(scheduler, request, candidates).await?;
            debug!(constraint = name, remaining = candidates.len(), "Removal constraint applied");
        }
        Ok(candidates)
    }
}

impl std::fmt::Debug for ConstraintRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// A constraint's value from `tags.constraints`.
fn value<'a>(tags: &'a Tags, name: &str) -> Option<&'a Value> {
    constraints_of(tags).and_then(|c| c.get(name))
}

/// A replica count: a non-negative integer or a numeric string.
pub(crate) fn count(tags: &Tags, name: &str) -> SchedulerResult<usize> {
    let invalid = |v: &Value| SchedulerError::InvalidConstraint {
        constraint: name.to_string(),
        value: v.to_string(),
    };

    let Some(v) = value(tags, name) else {
        return Err(SchedulerError::InvalidConstraint {
            constraint: name.to_string(),
            value: "null".to_string(),
        });
    };

    let parsed = match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    parsed
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(v))
}

/// A tag name: a non-empty string.
pub(crate) fn tag_name(tags: &Tags, name: &str) -> SchedulerResult<String> {
    match value(tags, name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        other => Err(SchedulerError::InvalidConstraint {
            constraint: name.to_string(),
            value: other.map_or_else(|| "null".to_string(), Value::to_string),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn tags(value: Value) -> Tags {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_active_constraints_intersect_known_names() {
        let registry = ConstraintRegistry::with_defaults();
        let active = registry.active_for(&tags(json!({
            "constraints": {"max": 2, "per_host": 1, "spread": "rack"}
        })));

        let names: Vec<&str> = active.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["max", "per_host"]);
        assert!(registry.active_for(&Tags::new()).is_empty());
    }

    #[test]
    fn test_register_replaces_by_name() {
        struct Noop;
        impl Constraint for Noop {}

        let mut registry = ConstraintRegistry::with_defaults();
        registry.register("max", Arc::new(Noop));
        registry.register("zone", Arc::new(Noop));

        assert_eq!(registry.names(), vec!["max", "min", "partition", "per_host", "zone"]);
    }

    #[rstest]
    #[case(json!({"constraints": {"max": 3}}), Some(3))]
    #[case(json!({"constraints": {"max": "4"}}), Some(4))]
    #[case(json!({"constraints": {"max": 2.0}}), Some(2))]
    #[case(json!({"constraints": {"max": -1}}), None)]
    #[case(json!({"constraints": {"max": "many"}}), None)]
    #[case(json!({"constraints": {}}), None)]
    fn test_count_parsing(#[case] value: Value, #[case] expected: Option<usize>) {
        assert_eq!(count(&tags(value), "max").ok(), expected);
    }

    #[test]
    fn test_tag_name_requires_string() {
        assert_eq!(
            tag_name(&tags(json!({"constraints": {"partition": "rack"}})), "partition").unwrap(),
            "rack"
        );
        assert!(tag_name(&tags(json!({"constraints": {"partition": 1}})), "partition").is_err());
    }
}
