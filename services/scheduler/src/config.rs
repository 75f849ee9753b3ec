//! Scheduler configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shipyard_reconcile::DEFAULT_HARMONIZE_INTERVAL;

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    /// Number of ports in the range.
    pub fn size(&self) -> usize {
        usize::from(self.max.saturating_sub(self.min)) + 1
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Container host ports.
pub const DEFAULT_CONTAINER_PORTS: PortRange = PortRange::new(11024, 22047);

/// Load-balancer discovery ports.
pub const DEFAULT_LOADBALANCER_PORTS: PortRange = PortRange::new(10000, 11023);

/// Tunables for placement and harmonization.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cluster identifier injected into container environments.
    pub cluster_id: String,

    pub container_ports: PortRange,

    pub loadbalancer_ports: PortRange,

    /// Extra memory charged per placed container during the vacancy scan.
    pub memory_overhead_mib: u64,

    /// Whether `per_host` harmonization also holds this node to the quota,
    /// even while it is the leader. Placement never targets leaders.
    pub per_host_include_self: bool,

    pub harmonization_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cluster_id: "local".to_string(),
            container_ports: DEFAULT_CONTAINER_PORTS,
            loadbalancer_ports: DEFAULT_LOADBALANCER_PORTS,
            memory_overhead_mib: 0,
            per_host_include_self: false,
            harmonization_interval: DEFAULT_HARMONIZE_INTERVAL,
        }
    }
}

/// Process configuration for the `scheduler` binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// JSON file describing hosts, applications, and variables.
    pub cluster_file: PathBuf,

    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = SchedulerConfig::default();

        let log_level =
            std::env::var("SHIPYARD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let cluster_file = std::env::var("SHIPYARD_CLUSTER_FILE")
            .unwrap_or_else(|_| "cluster.json".to_string())
            .into();

        let cluster_id =
            std::env::var("SHIPYARD_CLUSTER_ID").unwrap_or_else(|_| defaults.cluster_id.clone());

        let harmonization_interval = Duration::from_millis(env_or(
            "SHIPYARD_HARMONIZATION_INTERVAL_MS",
            defaults.harmonization_interval.as_millis() as u64,
        )?);
        if harmonization_interval.is_zero() {
            bail!("SHIPYARD_HARMONIZATION_INTERVAL_MS must be positive");
        }

        let container_ports = PortRange::new(
            env_or("SHIPYARD_CONTAINER_MIN_PORT", defaults.container_ports.min)?,
            env_or("SHIPYARD_CONTAINER_MAX_PORT", defaults.container_ports.max)?,
        );

        let loadbalancer_ports = PortRange::new(
            env_or("SHIPYARD_LOADBALANCER_MIN_PORT", defaults.loadbalancer_ports.min)?,
            env_or("SHIPYARD_LOADBALANCER_MAX_PORT", defaults.loadbalancer_ports.max)?,
        );

        for (name, range) in [
            ("container", container_ports),
            ("loadbalancer", loadbalancer_ports),
        ] {
            if range.min > range.max {
                bail!("{name} port range is inverted: {range}");
            }
        }

        let memory_overhead_mib = env_or("SHIPYARD_MEMORY_OVERHEAD_MIB", 0)?;

        let per_host_include_self = std::env::var("SHIPYARD_PER_HOST_INCLUDE_SELF")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(defaults.per_host_include_self);

        Ok(Self {
            log_level,
            cluster_file,
            scheduler: SchedulerConfig {
                cluster_id,
                container_ports,
                loadbalancer_ports,
                memory_overhead_mib,
                per_host_include_self,
                harmonization_interval,
            },
        })
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range_size_is_inclusive() {
        let range = PortRange::new(100, 103);
        assert_eq!(range.size(), 4);
        assert!(range.contains(100));
        assert!(range.contains(103));
        assert!(!range.contains(104));
    }

    #[test]
    fn test_default_ranges_do_not_overlap() {
        assert!(DEFAULT_LOADBALANCER_PORTS.max < DEFAULT_CONTAINER_PORTS.min);
    }

    #[test]
    fn test_defaults_for_open_choices() {
        let config = SchedulerConfig::default();
        assert_eq!(config.memory_overhead_mib, 0);
        assert!(!config.per_host_include_self);
    }
}
