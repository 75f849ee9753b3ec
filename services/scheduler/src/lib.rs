//! shipyard Scheduler
//!
//! The scheduler runs on the controlling leader of a shipyard cluster. It
//! decides where each application container runs and periodically drives
//! the cluster back toward every application's declared state.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler
//! ├── KvStore        (applications, containers, variables)
//! ├── Membership     (live hosts, never persisted)
//! ├── Constraints    (max, min, partition, per_host)
//! └── Engines        (start/stop placed containers)
//! ```
//!
//! ## Modules
//!
//! - `scheduler`: placement pipeline, constraints, harmonization
//! - `store`: KV store interface and in-memory implementation
//! - `membership`: cluster membership interface
//! - `engine`: runtime engine interface
//! - `seed`: cluster description loading for the dev binary

pub mod config;
pub mod engine;
pub mod error;
pub mod membership;
pub mod model;
pub mod scheduler;
pub mod seed;
pub mod store;

pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{HarmonizationWorker, Scheduler};
