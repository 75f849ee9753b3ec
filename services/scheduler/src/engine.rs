//! Container runtime engines.
//!
//! Engines start and stop containers on their assigned host. The scheduler
//! hands an engine the committed container record; everything below that
//! (image pulls, process supervision, log streaming) belongs to the engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use shipyard_id::ContainerId;
use tracing::info;

use crate::model::{Container, DEFAULT_ENGINE};

/// Runtime engine interface.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Start a placed container.
    async fn start(&self, container: &Container) -> Result<()>;

    /// Stop a container.
    async fn stop(&self, container: &Container) -> Result<()>;
}

/// Engines keyed by the name stored on container records.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn Engine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a single [`DryRunEngine`] under the default engine name.
    pub fn dry_run() -> (Self, Arc<DryRunEngine>) {
        let engine = Arc::new(DryRunEngine::new());
        let mut registry = Self::new();
        registry.register(DEFAULT_ENGINE, engine.clone());
        (registry, engine)
    }

    pub fn register(&mut self, name: impl Into<String>, engine: Arc<dyn Engine>) {
        self.engines.insert(name.into(), engine);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Engine>> {
        self.engines.get(name).cloned()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Engine call observed by [`DryRunEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Start(ContainerId),
    /// Records without a usable id are still stopped by host.
    Stop(Option<ContainerId>),
}

/// Engine that only logs and records what it was asked to do.
#[derive(Debug, Default)]
pub struct DryRunEngine {
    calls: Mutex<Vec<EngineCall>>,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: EngineCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl Engine for DryRunEngine {
    async fn start(&self, container: &Container) -> Result<()> {
        let Some(id) = container.id else {
            anyhow::bail!("refusing to start a container without an id");
        };

        info!(
            application = %container.application_name,
            container_id = %id,
            host = ?container.host,
            host_port = ?container.host_port,
            "[DRY RUN] Starting container"
        );
        self.record(EngineCall::Start(id));
        Ok(())
    }

    async fn stop(&self, container: &Container) -> Result<()> {
        info!(
            application = %container.application_name,
            container_id = ?container.id,
            host = ?container.host,
            "[DRY RUN] Stopping container"
        );
        self.record(EngineCall::Stop(container.id));
        Ok(())
    }
}
