//! # In-Memory Backend
//!
//! Process-local document maps. Each call takes the lock once, so every write is
//! atomic per document exactly as the contract requires, and no more.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Backend, BackendError, BaseEntityUpdate, EntityUpdate};
use crate::entity::{BaseEntity, Entity};
use crate::url::{Name, Reference};

//================================================================================================
// Types
//================================================================================================

/// A [`Backend`] holding every document in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    docs: RwLock<Documents>,
    migrations: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Documents {
    /// Keyed by base URL, then revision.
    entities: BTreeMap<Reference, BTreeMap<u32, Entity>>,
    base_entities: BTreeMap<Reference, BaseEntity>,
    counters: BTreeMap<Name, u32>,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for MemoryBackend {
    /// An empty store at the current schema: every known migration executed.
    fn default() -> Self {
        MemoryBackend::with_migrations(crate::migrate::KNOWN.iter().map(|m| (*m).to_owned()))
    }
}

impl MemoryBackend {
    /// An empty store reporting `migrations` as its executed set.
    pub fn with_migrations(migrations: impl IntoIterator<Item = String>) -> Self {
        MemoryBackend {
            docs: RwLock::default(),
            migrations: migrations.into_iter().collect(),
        }
    }
}

impl Documents {
    fn entity_mut(&mut self, url: &Reference) -> Option<&mut Entity> {
        let revision = url.revision()?;
        self.entities
            .get_mut(&url.base_url())?
            .get_mut(&revision)
            .filter(|e| &e.url == url)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn revision(
        &self,
        base: &Reference,
        revision: u32,
    ) -> Result<Option<Entity>, BackendError> {
        let docs = self.docs.read().await;
        Ok(docs
            .entities
            .get(&base.base_url())
            .and_then(|revs| revs.get(&revision))
            .cloned())
    }

    async fn entities(&self, base: &Reference) -> Result<Vec<Entity>, BackendError> {
        let docs = self.docs.read().await;
        Ok(docs
            .entities
            .get(&base.base_url())
            .map(|revs| revs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_entity(&self, entity: Entity) -> Result<bool, BackendError> {
        let Some(revision) = entity.url.revision() else {
            return Err(BackendError::Corrupt(entity.url.to_string()));
        };
        let mut docs = self.docs.write().await;
        let revs = docs.entities.entry(entity.base_url.clone()).or_default();
        if revs.contains_key(&revision) {
            return Ok(false);
        }
        revs.insert(revision, entity);
        Ok(true)
    }

    async fn update_entity(
        &self,
        url: &Reference,
        update: EntityUpdate,
    ) -> Result<Option<Entity>, BackendError> {
        let mut docs = self.docs.write().await;
        Ok(docs.entity_mut(url).map(|entity| {
            let before = entity.clone();
            update.apply(entity);
            before
        }))
    }

    async fn base_entity(&self, url: &Reference) -> Result<Option<BaseEntity>, BackendError> {
        Ok(self.docs.read().await.base_entities.get(url).cloned())
    }

    async fn base_entities_named(&self, name: &Name) -> Result<Vec<BaseEntity>, BackendError> {
        let docs = self.docs.read().await;
        Ok(docs
            .base_entities
            .values()
            .filter(|b| &b.name == name)
            .cloned()
            .collect())
    }

    async fn all_base_entities(&self) -> Result<Vec<BaseEntity>, BackendError> {
        Ok(self.docs.read().await.base_entities.values().cloned().collect())
    }

    async fn insert_base_entity(&self, base: BaseEntity) -> Result<bool, BackendError> {
        let mut docs = self.docs.write().await;
        if docs.base_entities.contains_key(&base.url) {
            return Ok(false);
        }
        docs.base_entities.insert(base.url.clone(), base);
        Ok(true)
    }

    async fn update_base_entity(
        &self,
        url: &Reference,
        update: BaseEntityUpdate,
    ) -> Result<Option<BaseEntity>, BackendError> {
        let mut docs = self.docs.write().await;
        Ok(docs.base_entities.get_mut(url).map(|base| {
            let before = base.clone();
            update.apply(base);
            before
        }))
    }

    async fn reserve_promulgated_revisions(
        &self,
        name: &Name,
        count: u32,
    ) -> Result<u32, BackendError> {
        let mut docs = self.docs.write().await;
        let next = docs.counters.entry(name.clone()).or_default();
        let first = *next;
        *next = first
            .checked_add(count)
            .ok_or_else(|| BackendError::Exhausted(name.clone()))?;
        Ok(first)
    }

    async fn executed_migrations(&self) -> Result<BTreeSet<String>, BackendError> {
        Ok(self.migrations.clone())
    }
}
