//! # Engine Errors
//!
//! The error taxonomy surfaced by every operation of the engine. Only
//! invariant repair during promulgation takes corrective action on its own;
//! everything else is reported upward unmodified and never retried here.

use std::time::Duration;

use thiserror::Error;

use crate::channel::ChannelError;
use crate::migrate::MigrationError;
use crate::store::BackendError;
use crate::url::UrlError;

//================================================================================================
// Types
//================================================================================================

/// An error returned by a store operation.
#[derive(Error, Debug)]
pub enum Error {
    /// No base entity, entity or channel pointer satisfies the request.
    #[error("not found: {0}")]
    NotFound(String),
    /// The request is malformed and was rejected before any write.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The write collides with an existing document.
    #[error("conflict: {0}")]
    Conflict(String),
    /// No backing-store session became free within the admission timeout.
    #[error("too many sessions in use (limit {limit}, waited {waited:?})")]
    ResourceExhausted {
        /// The configured session cap.
        limit: usize,
        /// How long the checkout waited.
        waited: Duration,
    },
    /// The persisted layout was advanced by code newer than this binary.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// A lower layer failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

//================================================================================================
// Impls
//================================================================================================

impl Error {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }

    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Error::InvalidRequest(what.into())
    }

    /// Whether this error reports a missing document or pointer.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ResourceExhausted { .. })
    }
}

impl From<UrlError> for Error {
    fn from(e: UrlError) -> Self {
        Error::InvalidRequest(e.to_string())
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Error::InvalidRequest(e.to_string())
    }
}
