//! Cluster data model: applications, containers, and hosts.
//!
//! Applications and containers are persisted as JSON in the cluster KV
//! store. Hosts come live from membership and are never persisted here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use shipyard_id::{ContainerId, HostId};
use shipyard_reconcile::RemovalPriority;

/// Free-form tag map. Values may nest.
pub type Tags = serde_json::Map<String, Value>;

/// Tag holding the constraint sub-map, e.g. `{"max": 5}`.
pub const CONSTRAINTS_TAG: &str = "constraints";

/// Tag holding opaque user metadata.
pub const METADATA_TAG: &str = "metadata";

/// Tag pinning a container to a host ID.
pub const HOST_TAG: &str = "host";

/// Engine used when a record does not name one.
pub const DEFAULT_ENGINE: &str = "docker";

/// Bytes per mebibyte; container memory is requested in MiB.
pub const MIB: u64 = 1024 * 1024;

fn default_engine() -> String {
    DEFAULT_ENGINE.to_string()
}

fn default_respawn() -> bool {
    true
}

/// Ids that are not `ctr_<ulid>` read as missing, so the rest of the record
/// survives and harmonization can repair it.
fn lenient_container_id<'de, D>(deserializer: D) -> Result<Option<ContainerId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(|s| s.parse().ok()))
}

// =============================================================================
// Hosts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostMode {
    Leader,
    Follower,
}

/// A fleet member as reported by cluster membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,

    #[serde(default)]
    pub host_name: Option<String>,

    pub mode: HostMode,

    #[serde(default)]
    pub tags: Tags,

    /// CPU capacity.
    pub cpus: f64,

    /// Memory capacity in bytes.
    pub memory: u64,
}

impl Host {
    pub fn is_follower(&self) -> bool {
        self.mode == HostMode::Follower
    }

    /// Tags with nested maps collapsed into dotted keys.
    pub fn flat_tags(&self) -> BTreeMap<String, Value> {
        flatten_tags(&self.tags)
    }
}

// =============================================================================
// Containers
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    #[default]
    Unloaded,
    Loading,
    Loaded,
}

impl ContainerStatus {
    pub fn removal_priority(&self) -> RemovalPriority {
        match self {
            Self::Unloaded => RemovalPriority::Unplaced,
            Self::Loading => RemovalPriority::Starting,
            Self::Loaded => RemovalPriority::Running,
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
        };
        f.write_str(s)
    }
}

/// Host path mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub host: Option<String>,
    pub container: String,
}

/// One placed or to-be-placed instance of an application.
///
/// `status == Loaded` implies `host.is_some()`; records violating that are
/// repaired by harmonization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Missing on corrupt records only.
    #[serde(default, deserialize_with = "lenient_container_id")]
    pub id: Option<ContainerId>,

    #[serde(default)]
    pub application_name: String,

    #[serde(default)]
    pub status: ContainerStatus,

    #[serde(default)]
    pub host: Option<HostId>,

    #[serde(default)]
    pub host_port: Option<u16>,

    #[serde(default)]
    pub container_port: Option<u16>,

    #[serde(default)]
    pub cpus: f64,

    /// Requested memory in MiB.
    #[serde(default)]
    pub memory: u64,

    #[serde(default)]
    pub tags: Tags,

    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default = "default_engine")]
    pub engine: String,

    /// Whether `host_port` was drawn at random and is released on unload.
    #[serde(default)]
    pub random_host_port: bool,

    #[serde(default)]
    pub network_mode: Option<String>,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,

    #[serde(default)]
    pub volumes: Vec<Volume>,

    #[serde(default = "default_respawn")]
    pub respawn: bool,
}

impl Container {
    /// Host this container is pinned to, from `tags.host` or `host`.
    pub fn pinned_host(&self) -> Option<HostId> {
        self.tags
            .get(HOST_TAG)
            .and_then(Value::as_str)
            .and_then(|s| HostId::new(s).ok())
            .or_else(|| self.host.clone())
    }

    pub fn is_on(&self, host: &HostId) -> bool {
        self.host.as_ref() == Some(host)
    }

    /// Loaded but hostless: an inconsistent record.
    pub fn is_orphaned(&self) -> bool {
        self.status == ContainerStatus::Loaded && self.host.is_none()
    }

    pub fn uses_host_network(&self) -> bool {
        self.network_mode.as_deref() == Some("host")
    }
}

// =============================================================================
// Applications
// =============================================================================

/// Health check definition carried on an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default = "HealthCheck::default_protocol")]
    pub protocol: String,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub status_code: Option<u16>,

    #[serde(default = "HealthCheck::default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "HealthCheck::default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "HealthCheck::default_threshold")]
    pub unhealthy_threshold: u32,
}

impl HealthCheck {
    fn default_protocol() -> String {
        "http".to_string()
    }

    fn default_interval_ms() -> u64 {
        15_000
    }

    fn default_timeout_ms() -> u64 {
        5_000
    }

    fn default_threshold() -> u32 {
        3
    }
}

/// Desired state for a named workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Application name; also the key suffix.
    pub id: String,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub cpus: f64,

    /// Requested memory in MiB.
    #[serde(default)]
    pub memory: u64,

    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,

    #[serde(default)]
    pub volumes: Vec<Volume>,

    #[serde(default)]
    pub network_mode: Option<String>,

    #[serde(default)]
    pub container_port: Option<u16>,

    #[serde(default)]
    pub tags: Tags,

    #[serde(default)]
    pub discovery_port: Option<u16>,

    #[serde(default)]
    pub health_checks: Vec<HealthCheck>,

    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default = "default_respawn")]
    pub respawn: bool,
}

impl Application {
    /// Minimal application with the given resource request.
    pub fn new(id: impl Into<String>, cpus: f64, memory_mib: u64) -> Self {
        Self {
            id: id.into(),
            image: String::new(),
            command: None,
            cpus,
            memory: memory_mib,
            env_vars: BTreeMap::new(),
            volumes: Vec::new(),
            network_mode: None,
            container_port: None,
            tags: Tags::new(),
            discovery_port: None,
            health_checks: Vec::new(),
            engine: default_engine(),
            respawn: true,
        }
    }

    /// The `tags.constraints` sub-map, if any.
    pub fn constraints(&self) -> Option<&Tags> {
        constraints_of(&self.tags)
    }
}

/// The `constraints` sub-map of a tag set.
pub fn constraints_of(tags: &Tags) -> Option<&Tags> {
    tags.get(CONSTRAINTS_TAG).and_then(Value::as_object)
}

/// Collapse nested maps and arrays into dotted keys.
///
/// `{"rack": {"row": 3}, "ssd": true}` becomes `{"rack.row": 3, "ssd": true}`.
pub fn flatten_tags(tags: &Tags) -> BTreeMap<String, Value> {
    fn walk(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (k, v) in map {
                    walk(&format!("{prefix}.{k}"), v, out);
                }
            }
            Value::Array(items) if !items.is_empty() => {
                for (i, v) in items.iter().enumerate() {
                    walk(&format!("{prefix}.{i}"), v, out);
                }
            }
            other => {
                out.insert(prefix.to_string(), other.clone());
            }
        }
    }

    let mut out = BTreeMap::new();
    for (k, v) in tags {
        walk(k, v, &mut out);
    }
    out
}

/// Render a tag value as a grouping key.
pub fn tag_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
