//! Shared fixtures for scheduler integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use shipyard_id::HostId;
use shipyard_scheduler::config::SchedulerConfig;
use shipyard_scheduler::engine::{DryRunEngine, EngineRegistry};
use shipyard_scheduler::membership::StaticMembership;
use shipyard_scheduler::model::{Application, Container, ContainerStatus, Host, HostMode, Tags, MIB};
use shipyard_scheduler::store::MemoryStore;
use shipyard_scheduler::Scheduler;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub membership: Arc<StaticMembership>,
    pub engine: Arc<DryRunEngine>,
    pub scheduler: Scheduler,
}

impl Harness {
    pub fn new(peers: Vec<Host>) -> Self {
        Self::with_config(peers, SchedulerConfig::default())
    }

    pub fn with_config(peers: Vec<Host>, config: SchedulerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let membership = Arc::new(StaticMembership::new(leader("leader-0"), peers));
        let (engines, engine) = EngineRegistry::dry_run();
        let scheduler = Scheduler::new(store.clone(), membership.clone(), config).with_engines(engines);

        Self {
            store,
            membership,
            engine,
            scheduler,
        }
    }

    pub async fn put_application(&self, application: &Application) {
        self.scheduler.put_application(application).await.unwrap();
    }

    pub async fn containers(&self, application: &str) -> Vec<Container> {
        self.scheduler.get_containers(application).await.unwrap()
    }

    pub async fn count_with_status(&self, application: &str, status: ContainerStatus) -> usize {
        self.containers(application)
            .await
            .iter()
            .filter(|c| c.status == status)
            .count()
    }

    pub async fn count_on(&self, application: &str, host: &str) -> usize {
        self.containers(application)
            .await
            .iter()
            .filter(|c| c.host.as_ref().is_some_and(|h| h.as_str() == host))
            .count()
    }
}

pub fn tags(value: Value) -> Tags {
    value.as_object().cloned().unwrap()
}

pub fn follower(id: &str, cpus: f64, memory_mib: u64, host_tags: Value) -> Host {
    Host {
        id: HostId::new(id).unwrap(),
        host_name: Some(format!("{id}.local")),
        mode: HostMode::Follower,
        tags: tags(host_tags),
        cpus,
        memory: memory_mib * MIB,
    }
}

pub fn leader(id: &str) -> Host {
    Host {
        id: HostId::new(id).unwrap(),
        host_name: Some(format!("{id}.local")),
        mode: HostMode::Leader,
        tags: Tags::new(),
        cpus: 1.0,
        memory: 1024 * MIB,
    }
}

/// Small application with the given constraints.
pub fn application(name: &str, constraints: Value) -> Application {
    let mut app = Application::new(name, 0.1, 64);
    app.image = "registry.local/app:latest".to_string();
    if !constraints.is_null() {
        app.tags = tags(json!({ "constraints": constraints }));
    }
    app
}

/// A container record as a runtime would have left it.
pub fn stored(application: &str, host: Option<&str>, status: &str) -> Container {
    serde_json::from_value(json!({
        "id": shipyard_id::ContainerId::new(),
        "application_name": application,
        "host": host,
        "status": status,
        "cpus": 0.1,
        "memory": 64
    }))
    .unwrap()
}
