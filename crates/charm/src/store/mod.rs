//! # Document Store Interface
//!
//! This module defines the contract the engine requires of its backing store,
//! and the [`Store`] facade through which every engine operation runs.
//!
//! ## The Backend Contract
//!
//! A [`Backend`] holds three collections: entities, base entities and per-name
//! promulgation counters. It guarantees exactly one thing about concurrency: each
//! individual call that writes touches one document and applies atomically. There
//! is no multi-document transaction, and the engine never assumes one.
//!
//! Writes are expressed as [`EntityUpdate`] / [`BaseEntityUpdate`] values so that
//! every backend applies them with the same read-modify-write semantics under its
//! own per-document atomicity. Update calls hand back the document as it was
//! *before* the write, which is how multi-step operations learn what they
//! displaced without a second, racy read.
//!
//! ## Backends
//!
//! - [`memory::MemoryBackend`] - process-local maps, used by tests and embedders.
//! - [`fs::FsBackend`] - one JSON document per file, each write atomically
//!   persisted over its target.
//!
//! ## Sessions
//!
//! Each public [`Store`] operation checks out one [`Session`] from the bounded
//! [`SessionPool`] and performs all of its backend calls through it. Internal
//! helpers take the session, never the store, so an operation holds exactly one
//! slot of the pool however deeply it nests.

pub mod fs;
pub mod memory;

use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;

use crate::channel::Channel;
use crate::entity::{Acl, BaseEntity, Entity};
use crate::error::Error;
use crate::pool::SessionPool;
use crate::search::{NoIndex, Reindex};
use crate::url::{Name, Reference, Series};

//================================================================================================
// Types
//================================================================================================

/// A failure in the layer beneath the engine.
#[derive(Error, Debug)]
pub enum BackendError {
    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A document failed to (de)serialize.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// A temporary document could not be persisted over its target.
    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
    /// A `tokio` task failed to join.
    #[error(transparent)]
    JoinFailed(#[from] tokio::task::JoinError),
    /// A persisted document does not match the key it is stored under.
    #[error("corrupt document at {0}")]
    Corrupt(String),
    /// The promulgated revision counter of a name cannot grow any further.
    #[error("promulgated revisions of {0} are exhausted")]
    Exhausted(Name),
}

/// A single-document write to an [`Entity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityUpdate {
    /// Flag the entity as pointed at by each channel.
    Publish(Vec<Channel>),
    /// Clear the flag for one channel.
    Unpublish(Channel),
    /// Set or clear the promulgated mirror.
    Promulgate(Option<Reference>),
    /// Set a free-form annotation.
    Annotate(String, serde_json::Value),
}

/// A single-document write to a [`BaseEntity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseEntityUpdate {
    /// Point every `(channel, series)` pair at `url`, overwriting what was there.
    Point {
        /// The release channels to update.
        channels: Vec<Channel>,
        /// The series keys to update under each channel.
        series: Vec<Series>,
        /// The revision to release.
        url: Reference,
    },
    /// Set the promulgation flag.
    Promulgated(bool),
    /// Replace the ACL of each channel.
    Acl {
        /// The channels to write.
        channels: Vec<Channel>,
        /// The permissions to materialize on each.
        acl: Acl,
    },
}

/// The storage contract of the engine. See the [module documentation](self).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the entity stored under `base` at `revision`, whatever its series.
    async fn revision(
        &self,
        base: &Reference,
        revision: u32,
    ) -> Result<Option<Entity>, BackendError>;

    /// Every revision stored under `base`, ordered by revision.
    async fn entities(&self, base: &Reference) -> Result<Vec<Entity>, BackendError>;

    /// Store a new entity. Returns `false`, writing nothing, if its revision is taken.
    async fn insert_entity(&self, entity: Entity) -> Result<bool, BackendError>;

    /// Apply `update` to one entity, returning it as it was before the write, or
    /// `None` if it does not exist.
    async fn update_entity(
        &self,
        url: &Reference,
        update: EntityUpdate,
    ) -> Result<Option<Entity>, BackendError>;

    /// Fetch one base entity.
    async fn base_entity(&self, url: &Reference) -> Result<Option<BaseEntity>, BackendError>;

    /// Every base entity sharing `name`, across all users, ordered by URL.
    async fn base_entities_named(&self, name: &Name) -> Result<Vec<BaseEntity>, BackendError>;

    /// Every base entity in the store, ordered by URL.
    async fn all_base_entities(&self) -> Result<Vec<BaseEntity>, BackendError>;

    /// Store a new base entity. Returns `false`, writing nothing, if it exists.
    async fn insert_base_entity(&self, base: BaseEntity) -> Result<bool, BackendError>;

    /// Apply `update` to one base entity, returning it as it was before the write,
    /// or `None` if it does not exist.
    async fn update_base_entity(
        &self,
        url: &Reference,
        update: BaseEntityUpdate,
    ) -> Result<Option<BaseEntity>, BackendError>;

    /// Atomically reserve `count` consecutive promulgated revisions for `name`,
    /// returning the first. Reserved values are never handed out again.
    async fn reserve_promulgated_revisions(
        &self,
        name: &Name,
        count: u32,
    ) -> Result<u32, BackendError>;

    /// The names of the schema migrations already applied to this store.
    async fn executed_migrations(&self) -> Result<BTreeSet<String>, BackendError>;
}

/// The engine facade: a backend, the pool admitting work onto it, and the
/// search hook notified of release changes.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
    pool: SessionPool,
    search: Arc<dyn Reindex>,
}

/// One admitted unit of work against the backend. Releases its pool slot on drop.
pub struct Session<'a> {
    backend: &'a (dyn Backend + 'static),
    _permit: OwnedSemaphorePermit,
}

//================================================================================================
// Impls
//================================================================================================

impl EntityUpdate {
    pub(crate) fn apply(&self, entity: &mut Entity) {
        match self {
            EntityUpdate::Publish(channels) => {
                for channel in channels.iter().filter(|c| c.is_release()) {
                    entity.published.insert(*channel, true);
                }
            },
            EntityUpdate::Unpublish(channel) => {
                entity.published.remove(channel);
            },
            EntityUpdate::Promulgate(url) => entity.promulgated_url = url.clone(),
            EntityUpdate::Annotate(key, value) => {
                entity.extra_info.insert(key.clone(), value.clone());
            },
        }
    }
}

impl BaseEntityUpdate {
    pub(crate) fn apply(&self, base: &mut BaseEntity) {
        match self {
            BaseEntityUpdate::Point {
                channels,
                series,
                url,
            } => {
                for channel in channels.iter().filter(|c| c.is_release()) {
                    let pointers = base.channel_entities.entry(*channel).or_default();
                    for s in series {
                        pointers.insert(s.clone(), url.clone());
                    }
                }
            },
            BaseEntityUpdate::Promulgated(flag) => base.promulgated = *flag,
            BaseEntityUpdate::Acl { channels, acl } => {
                for channel in channels {
                    base.acls.insert(*channel, acl.clone());
                }
            },
        }
    }
}

impl Store {
    /// Open the engine over `backend`, failing fast if the backend's schema was
    /// advanced by a migration this code does not know.
    pub async fn open(backend: Arc<dyn Backend>, pool: SessionPool) -> Result<Self, Error> {
        let store = Store {
            backend,
            pool,
            search: Arc::new(NoIndex),
        };
        let executed = store.session().await?.executed_migrations().await?;
        crate::migrate::verify(&executed)?;
        tracing::debug!(migrations = executed.len(), "opened charm store");
        Ok(store)
    }

    /// Replace the search hook notified after release changes.
    #[must_use]
    pub fn with_search(mut self, search: Arc<dyn Reindex>) -> Self {
        self.search = search;
        self
    }

    /// The pool admitting sessions onto the backend.
    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Check out a session, waiting at most the pool's admission timeout.
    pub async fn session(&self) -> Result<Session<'_>, Error> {
        let permit = self.pool.checkout().await?;
        Ok(Session {
            backend: self.backend.as_ref(),
            _permit: permit,
        })
    }

    pub(crate) async fn reindex(&self, urls: &BTreeSet<Reference>) {
        for url in urls {
            tracing::debug!(%url, "requesting search reindex");
            self.search.reindex(url).await;
        }
    }
}

impl Deref for Session<'_> {
    type Target = dyn Backend;

    fn deref(&self) -> &Self::Target {
        self.backend
    }
}

impl Session<'_> {
    /// Fetch a base entity or fail with [`Error::NotFound`].
    pub(crate) async fn require_base(&self, url: &Reference) -> Result<BaseEntity, Error> {
        self.base_entity(url)
            .await?
            .ok_or_else(|| Error::not_found(url))
    }
}
