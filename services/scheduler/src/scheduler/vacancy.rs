//! Resource accounting for candidate hosts.
//!
//! Capacity comes from membership. Usage is every persisted container in the
//! cluster whose `host` is a candidate, regardless of application.

use std::collections::HashMap;

use shipyard_id::HostId;
use tracing::debug;

use super::Scheduler;
use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{Container, Host, MIB};

/// Requested resources of a single container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resources {
    pub cpus: f64,
    pub memory_mib: u64,
}

impl Resources {
    pub fn of(container: &Container) -> Self {
        Self {
            cpus: container.cpus,
            memory_mib: container.memory,
        }
    }

    fn memory_bytes(&self) -> i64 {
        i64::try_from(self.memory_mib.saturating_mul(MIB)).unwrap_or(i64::MAX)
    }
}

/// A host with what is left after subtracting placed containers.
#[derive(Debug, Clone)]
pub struct HostVacancy {
    pub host: Host,
    pub available_cpus: f64,
    /// Bytes. May go negative when the host is overcommitted.
    pub available_memory: i64,
}

impl HostVacancy {
    fn new(host: Host) -> Self {
        let available_memory = i64::try_from(host.memory).unwrap_or(i64::MAX);
        Self {
            available_cpus: host.cpus,
            available_memory,
            host,
        }
    }

    /// Whether the request fits. CPU is compared at two decimal places.
    pub fn fits(&self, request: &Resources) -> bool {
        round_cpus(self.available_cpus) >= round_cpus(request.cpus)
            && self.available_memory >= request.memory_bytes()
    }
}

fn round_cpus(cpus: f64) -> f64 {
    (cpus * 100.0).round() / 100.0
}

/// Subtract every placed container from its host's capacity.
///
/// Containers on hosts outside `hosts` are ignored. `overhead_mib` is charged
/// once per placed container on top of its own request.
pub fn compute_vacancy(hosts: Vec<Host>, placed: &[Container], overhead_mib: u64) -> Vec<HostVacancy> {
    let mut vacancies: Vec<HostVacancy> = hosts.into_iter().map(HostVacancy::new).collect();
    let index: HashMap<HostId, usize> = vacancies
        .iter()
        .enumerate()
        .map(|(i, v)| (v.host.id.clone(), i))
        .collect();

    for container in placed {
        let Some(&i) = container.host.as_ref().and_then(|h| index.get(h)) else {
            continue;
        };

        let used = Resources {
            cpus: container.cpus,
            memory_mib: container.memory.saturating_add(overhead_mib),
        };
        let vacancy = &mut vacancies[i];
        vacancy.available_cpus -= used.cpus;
        vacancy.available_memory = vacancy.available_memory.saturating_sub(used.memory_bytes());
    }

    vacancies
}

/// Keep hosts with room for `request`.
pub fn filter_vacant(hosts: Vec<Host>, placed: &[Container], overhead_mib: u64, request: &Resources) -> Vec<Host> {
    compute_vacancy(hosts, placed, overhead_mib)
        .into_iter()
        .filter(|v| v.fits(request))
        .map(|v| v.host)
        .collect()
}

impl Scheduler {
    /// The `by_vacancy` stage of placement.
    pub(crate) async fn filter_by_vacancy(
        &self,
        hosts: Vec<Host>,
        request: &Resources,
    ) -> SchedulerResult<Vec<Host>> {
        let placed = self.get_all_containers().await?;
        let candidates = hosts.len();
        let vacant = filter_vacant(hosts, &placed, self.config().memory_overhead_mib, request);

        debug!(
            candidates,
            vacant = vacant.len(),
            cpus = request.cpus,
            memory_mib = request.memory_mib,
            "Vacancy filter applied"
        );

        if vacant.is_empty() {
            return Err(SchedulerError::InsufficientResources);
        }
        Ok(vacant)
    }
}
