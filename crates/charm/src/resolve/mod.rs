//! # Reference Resolution
//!
//! Turns a possibly partial [`Reference`] into stored artifacts.
//!
//! - [`Store::expand_url`] lists every stored URL a reference could mean. It is the
//!   only operation returning more than one candidate.
//! - [`Store::find_entity`] resolves a revision-qualified reference exactly.
//! - [`Store::find_best_entity`] additionally resolves unrevisioned references
//!   through the release pointers of a channel.
//!
//! ## Namespaces
//!
//! A reference carrying a user resolves under that user's base entity. A user-less
//! reference resolves under the owner currently holding the promulgated alias for
//! the name, translating promulgated revisions back to the owned entity. When no
//! owner is promulgated but exactly one owner publishes the name at all, that sole
//! owner answers unrevisioned references through its release pointers. A revision
//! on a user-less reference is always a promulgated revision, so without a
//! promulgated owner it names nothing. Anything else is ambiguous, and ambiguity
//! is always [`Error::NotFound`], never a silent pick.
//!
//! ## Consistency
//!
//! Release pointers on the base entity are the source of truth for unrevisioned
//! resolution; an entity's `published` flags are auxiliary and may lag. A pointer
//! whose entity cannot be read is treated as not yet visible.


use std::collections::BTreeSet;

use crate::channel::Channel;
use crate::entity::{BaseEntity, Entity};
use crate::error::Error;
use crate::store::{Session, Store};
use crate::url::{Name, Reference};

//================================================================================================
// Types
//================================================================================================

/// Who answers for a user-less reference.
#[derive(Debug)]
enum Owner {
    /// The base entity holding the promulgated alias; revisions are promulgated.
    Promulgated(BaseEntity),
    /// The only base entity carrying the name; revisions are its own.
    Sole(BaseEntity),
}

//================================================================================================
// Impls
//================================================================================================

impl Owner {
    fn base(&self) -> &BaseEntity {
        match self {
            Owner::Promulgated(base) | Owner::Sole(base) => base,
        }
    }
}

impl Store {
    /// Every stored URL sharing the reference's base URL whose series and revision
    /// satisfy whatever constraints the reference carries. User-less references
    /// expand to promulgated URLs. Zero matches is an empty result, not an error.
    pub async fn expand_url(&self, url: &Reference) -> Result<Vec<Reference>, Error> {
        self.session().await?.expand_url(url).await
    }

    /// Resolve a revision-qualified reference to exactly one entity.
    pub async fn find_entity(&self, url: &Reference) -> Result<Entity, Error> {
        self.session().await?.find_entity(url).await
    }

    /// Resolve any reference to exactly one entity, consulting the release pointers
    /// of the reference's channel (stable by default) when no revision is given.
    pub async fn find_best_entity(&self, url: &Reference) -> Result<Entity, Error> {
        self.session().await?.find_best_entity(url).await
    }
}

impl Session<'_> {
    pub(crate) async fn expand_url(&self, url: &Reference) -> Result<Vec<Reference>, Error> {
        if let Some(channel) = url.channel() {
            return Err(Error::invalid(format!(
                "cannot expand {url} within channel {channel}: expansion ignores release pointers"
            )));
        }

        let mut found = BTreeSet::new();
        if url.is_promulgated_namespace() {
            for base in self.base_entities_named(url.name()).await? {
                if !base.promulgated {
                    continue;
                }
                for entity in self.entities(&base.url).await? {
                    let Some(promulgated) = &entity.promulgated_url else {
                        continue;
                    };
                    if satisfies(url, &entity, entity.promulgated_revision()) {
                        found.insert(promulgated.clone());
                    }
                }
            }
        } else {
            for entity in self.entities(&url.base_url()).await? {
                if satisfies(url, &entity, entity.url.revision()) {
                    found.insert(entity.url);
                }
            }
        }

        tracing::debug!(%url, matches = found.len(), "expanded reference");
        Ok(found.into_iter().collect())
    }

    pub(crate) async fn find_entity(&self, url: &Reference) -> Result<Entity, Error> {
        let Some(revision) = url.revision() else {
            return Err(Error::invalid(format!(
                "{url} has no revision; use best-entity resolution"
            )));
        };

        let entity = match url.user() {
            Some(_) => self.revision(&url.base_url(), revision).await?,
            None => match self.owner(url.name()).await? {
                Owner::Promulgated(base) => self
                    .entities(&base.url)
                    .await?
                    .into_iter()
                    .find(|e| e.promulgated_revision() == Some(revision)),
                Owner::Sole(base) => {
                    tracing::debug!(%url, owner = %base.url, "no promulgated revisions to match");
                    None
                },
            },
        };

        let entity = entity
            .filter(|e| url.series().is_none_or(|s| e.matches_series(s)))
            .ok_or_else(|| Error::not_found(url))?;

        tracing::debug!(%url, entity = %entity.url, "resolved reference");
        Ok(entity)
    }

    pub(crate) async fn find_best_entity(&self, url: &Reference) -> Result<Entity, Error> {
        if url.revision().is_some() {
            return self.find_entity(url).await;
        }

        let channel = url.channel().unwrap_or(Channel::DEFAULT);
        if !channel.is_release() {
            return Err(Error::invalid(format!(
                "{url}: resolving within {channel} requires an explicit revision"
            )));
        }

        let base = match url.user() {
            Some(_) => self.require_base(&url.base_url()).await?,
            None => match self.owner(url.name()).await? {
                Owner::Promulgated(base) | Owner::Sole(base) => base,
            },
        };

        let pointers = base
            .channel_entities
            .get(&channel)
            .ok_or_else(|| Error::not_found(format!("{url} in channel {channel}")))?;

        let target = match url.series() {
            Some(series) => pointers.get(series),
            None => {
                let distinct: BTreeSet<&Reference> = pointers.values().collect();
                match distinct.len() {
                    1 => distinct.into_iter().next(),
                    n => {
                        tracing::debug!(%url, %channel, candidates = n, "no single release");
                        None
                    },
                }
            },
        }
        .ok_or_else(|| Error::not_found(format!("{url} in channel {channel}")))?;

        let entity = match target.revision() {
            Some(rev) => self.revision(&target.base_url(), rev).await?,
            None => None,
        };
        let Some(entity) = entity.filter(|e| &e.url == target) else {
            tracing::debug!(%url, %target, "release pointer not yet visible");
            return Err(Error::not_found(target));
        };

        tracing::debug!(%url, %channel, entity = %entity.url, "resolved best entity");
        Ok(entity)
    }

    /// Pick who answers for user-less references to `name`.
    async fn owner(&self, name: &Name) -> Result<Owner, Error> {
        let bases = self.base_entities_named(name).await?;
        let (mut promulgated, others): (Vec<_>, Vec<_>) =
            bases.into_iter().partition(|b| b.promulgated);

        let owner = match (promulgated.len(), others.len()) {
            (1, _) => promulgated.pop().map(Owner::Promulgated),
            (0, 1) => others.into_iter().next().map(Owner::Sole),
            (0, _) => None,
            (n, _) => {
                tracing::warn!(%name, owners = n, "multiple promulgated owners, refusing to pick");
                None
            },
        };

        let owner = owner.ok_or_else(|| Error::not_found(Reference::new(name.clone())))?;
        tracing::trace!(%name, owner = %owner.base().url, "selected owner");
        Ok(owner)
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Whether `entity` matches the constraints of `url`, comparing the revision in
/// the reference's own namespace.
fn satisfies(url: &Reference, entity: &Entity, revision: Option<u32>) -> bool {
    let series_ok = url.series().is_none_or(|s| entity.matches_series(s));
    let revision_ok = url.revision().is_none_or(|r| revision == Some(r));
    series_ok && revision_ok
}
