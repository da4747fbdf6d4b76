//! # Schema Migration Guard
//!
//! The migration runner is external; the engine only refuses to run on a store
//! whose persisted layout was advanced by code newer than itself. A backend
//! reports the names of the migrations already executed against it, and any name
//! missing from [`KNOWN`] is fatal at startup.

use std::collections::BTreeSet;

use thiserror::Error;

/// Every migration this code understands, oldest first.
pub const KNOWN: &[&str] = &[
    "entity ids denormalization",
    "base entities",
    "read acl",
    "write acl",
    "populate promulgated urls",
    "add supported series",
    "new channel model",
    "channel scoped acls",
    "per-name promulgated counter",
];

/// A persisted layout this code cannot operate on.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MigrationError {
    /// The store records a migration unknown to the running code.
    #[error("store was migrated by newer code: unknown migration {0:?}")]
    Unknown(String),
}

/// Fail if `executed` names any migration not in [`KNOWN`].
pub fn verify(executed: &BTreeSet<String>) -> Result<(), MigrationError> {
    match executed.iter().find(|m| !KNOWN.contains(&m.as_str())) {
        Some(unknown) => Err(MigrationError::Unknown(unknown.clone())),
        None => Ok(()),
    }
}
