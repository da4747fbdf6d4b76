//! # Search Reindex Hook
//!
//! The search indexer is an external collaborator. After a publication or
//! promulgation change that moves a stable-channel pointer, the engine hands it
//! the affected URLs; the indexer then reads current resolver state back on its
//! own schedule, so the notification only needs to be eventual.

use async_trait::async_trait;

use crate::url::Reference;

/// A sink for reindex requests.
#[async_trait]
pub trait Reindex: Send + Sync {
    /// Request that `url` be reindexed. Failures are the indexer's to handle.
    async fn reindex(&self, url: &Reference);
}

/// A hook that discards every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndex;

#[async_trait]
impl Reindex for NoIndex {
    async fn reindex(&self, url: &Reference) {
        tracing::trace!(%url, "no search index configured");
    }
}
