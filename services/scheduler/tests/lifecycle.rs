//! Integration tests for container lifecycle operations.

mod common;

use std::sync::Arc;

use common::{application, follower, stored, Harness};
use serde_json::json;
use shipyard_scheduler::config::SchedulerConfig;
use shipyard_scheduler::engine::EngineCall;
use shipyard_scheduler::membership::StaticMembership;
use shipyard_scheduler::model::ContainerStatus;
use shipyard_scheduler::scheduler::{ContainerOverrides, ContainerState};
use shipyard_scheduler::store::MemoryStore;
use shipyard_scheduler::{Scheduler, SchedulerError};

#[tokio::test]
async fn test_remove_containers_prefers_unplaced() {
    let harness = Harness::new(vec![follower("host-a", 4.0, 4096, json!({}))]);
    harness.put_application(&application("web", json!(null))).await;

    let loaded = stored("web", Some("host-a"), "loaded");
    let loading = stored("web", Some("host-a"), "loading");
    let unloaded = stored("web", None, "unloaded");
    for container in [&loaded, &loading, &unloaded] {
        harness.scheduler.put_container("web", container).await.unwrap();
    }

    let removed = harness.scheduler.remove_containers("web", 2).await.unwrap();

    assert_eq!(removed, vec![unloaded.id.unwrap(), loading.id.unwrap()]);
    let remaining = harness.containers("web").await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, loaded.id);
    assert_eq!(harness.engine.calls(), vec![EngineCall::Stop(loading.id)]);
}

#[tokio::test]
async fn test_remove_more_than_exist_takes_all() {
    let harness = Harness::new(vec![follower("host-a", 4.0, 4096, json!({}))]);
    harness.put_application(&application("web", json!({"min": 5}))).await;
    for _ in 0..2 {
        let container = stored("web", Some("host-a"), "loaded");
        harness.scheduler.put_container("web", &container).await.unwrap();
    }

    let removed = harness.scheduler.remove_containers("web", 3).await.unwrap();
    assert_eq!(removed.len(), 2);
    assert!(harness.containers("web").await.is_empty());
}

#[tokio::test]
async fn test_min_limits_scale_down() {
    let harness = Harness::new(vec![follower("host-a", 4.0, 4096, json!({}))]);
    harness.put_application(&application("web", json!({"min": 2}))).await;
    for _ in 0..3 {
        let container = stored("web", Some("host-a"), "loaded");
        harness.scheduler.put_container("web", &container).await.unwrap();
    }

    let selected = harness.scheduler.select_removals("web", 2).await.unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(harness.containers("web").await.len(), 3);
}

#[tokio::test]
async fn test_redeploy_container_restarts_elsewhere_or_same() {
    let harness = Harness::new(vec![follower("host-a", 4.0, 4096, json!({}))]);
    harness.put_application(&application("web", json!(null))).await;

    let placed = harness
        .scheduler
        .deploy_container("web", ContainerOverrides::default())
        .await
        .unwrap();
    let id = placed.id.unwrap();

    let replaced = harness.scheduler.redeploy_container("web", id).await.unwrap();

    assert_eq!(replaced.id, Some(id));
    assert_eq!(replaced.status, ContainerStatus::Loading);
    assert_eq!(harness.containers("web").await.len(), 1);
    assert_eq!(
        harness.engine.calls(),
        vec![EngineCall::Start(id), EngineCall::Stop(Some(id)), EngineCall::Start(id)]
    );
}

#[tokio::test]
async fn test_missing_engine_unloads_container() {
    let store = Arc::new(MemoryStore::new());
    let membership = Arc::new(StaticMembership::new(
        common::leader("leader-0"),
        vec![follower("host-a", 4.0, 4096, json!({}))],
    ));
    let scheduler = Scheduler::new(store, membership, SchedulerConfig::default());
    scheduler
        .put_application(&application("web", json!(null)))
        .await
        .unwrap();

    let err = scheduler
        .deploy_container("web", ContainerOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::EngineNotFound(ref name) if name == "docker"));

    let containers = scheduler.get_containers("web").await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].status, ContainerStatus::Unloaded);
    assert!(containers[0].host.is_none());
    assert!(containers[0].host_port.is_none());
}

#[tokio::test]
async fn test_runtime_state_updates() {
    let harness = Harness::new(vec![follower("host-a", 4.0, 4096, json!({}))]);
    harness.put_application(&application("web", json!(null))).await;
    let placed = harness
        .scheduler
        .deploy_container("web", ContainerOverrides::default())
        .await
        .unwrap();
    let id = placed.id.unwrap();

    let started = chrono::Utc::now();
    harness
        .scheduler
        .update_container_state(
            "web",
            id,
            ContainerState {
                status: ContainerStatus::Loaded,
                host: placed.host.clone(),
                host_port: None,
                start_time: Some(started),
                respawn: true,
            },
        )
        .await
        .unwrap();

    let loaded = harness.scheduler.get_container("web", id).await.unwrap();
    assert_eq!(loaded.status, ContainerStatus::Loaded);
    assert_eq!(loaded.start_time, Some(started));
    assert_eq!(loaded.host_port, placed.host_port);

    harness.scheduler.unload_container("web", id).await.unwrap();
    let unloaded = harness.scheduler.get_container("web", id).await.unwrap();
    assert_eq!(unloaded.status, ContainerStatus::Unloaded);
    assert!(unloaded.host.is_none());
    assert!(unloaded.host_port.is_none());

    let exited = ContainerState {
        respawn: false,
        ..ContainerState::unloaded()
    };
    harness
        .scheduler
        .update_container_state("web", id, exited)
        .await
        .unwrap();
    assert!(matches!(
        harness.scheduler.get_container("web", id).await,
        Err(SchedulerError::ContainerNotFound { .. })
    ));
}

#[tokio::test]
async fn test_loadbalancer_port_allocation() {
    let config = SchedulerConfig {
        loadbalancer_ports: shipyard_scheduler::config::PortRange::new(10000, 10002),
        ..SchedulerConfig::default()
    };
    let harness = Harness::with_config(vec![], config);

    let mut db = application("db", json!(null));
    db.discovery_port = Some(10000);
    harness.put_application(&db).await;

    assert_eq!(
        harness.scheduler.allocate_loadbalancer_port(Some(10001)).await.unwrap(),
        10001
    );
    assert!(matches!(
        harness.scheduler.allocate_loadbalancer_port(Some(10000)).await,
        Err(SchedulerError::DiscoveryPortInUse(10000))
    ));
    assert!(matches!(
        harness.scheduler.allocate_loadbalancer_port(Some(80)).await,
        Err(SchedulerError::InvalidPort { port: 80, .. })
    ));

    let port = harness.scheduler.allocate_loadbalancer_port(None).await.unwrap();
    assert!(port == 10001 || port == 10002);

    for (name, port) in [("api", 10001), ("web", 10002)] {
        let mut app = application(name, json!(null));
        app.discovery_port = Some(port);
        harness.put_application(&app).await;
    }
    assert!(matches!(
        harness.scheduler.allocate_loadbalancer_port(None).await,
        Err(SchedulerError::NoDiscoveryPortsAvailable)
    ));
}

#[tokio::test]
async fn test_pattern_characters_are_rejected_in_names() {
    let harness = Harness::new(vec![follower("host-a", 4.0, 4096, json!({}))]);
    harness.put_application(&application("web", json!(null))).await;
    harness
        .scheduler
        .deploy_container("web", ContainerOverrides::default())
        .await
        .unwrap();

    for name in ["w*", "web::db", ""] {
        assert!(matches!(
            harness.scheduler.put_application(&application(name, json!(null))).await,
            Err(SchedulerError::InvalidName(ref n)) if n == name
        ));
    }
    assert!(matches!(
        harness.scheduler.put_variable("*", "x").await,
        Err(SchedulerError::InvalidName(_))
    ));

    assert_eq!(
        harness.scheduler.list_application_names().await.unwrap(),
        vec!["web".to_string()]
    );
}
