//! # shipyard-id
//!
//! Identifier types shared by the shipyard scheduler.
//!
//! ## Container IDs
//!
//! Container records get a system-generated ID that is stable for the life of
//! the record and independent of whatever ID the container runtime assigns.
//! The format is `{prefix}_{ulid}`, e.g. `ctr_01HV4Z4NYPLTRS0JTUA8XDME5F`.
//!
//! ## Host IDs
//!
//! Host IDs are owned by cluster membership. The scheduler never mints them,
//! so [`HostId`] only wraps the opaque string and rejects empty values.

mod error;
#[doc(hidden)]
pub mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
