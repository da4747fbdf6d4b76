//! # Publication
//!
//! The two write paths that maintain cross-document invariants without a
//! multi-document transaction.
//!
//! ## Publish
//!
//! [`Store::publish`] releases one uploaded revision on a set of channels. The
//! single-document writes are ordered so that a reader between any two of them
//! never meets a pointer whose target is unflagged:
//!
//! 1. flag the revision as published on each channel,
//! 2. point every series it supports at it, in one write to the base entity,
//! 3. clear the flag on each displaced revision no series still points at.
//!
//! The last publish always wins. Releasing an older revision over a newer one
//! is an explicit rollback and is allowed.
//!
//! ## Promulgation
//!
//! [`Store::set_promulgated`] grants or revokes the user-less alias for a name.
//! It touches one base entity per owner of the name and every entity beneath
//! them, so it cannot be atomic. Instead it converges: every call first demotes
//! any *other* owner still flagged for the name, repairing the remains of an
//! interrupted earlier call, and only assigns promulgated revisions to entities
//! still lacking one. Running the same call again after a failure finishes the
//! job; running it twice is the same as running it once.
//!
//! Promulgated revisions come from a per-name counter in the backend, so they
//! are never reused, even across a revoke and re-grant.

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;

use crate::channel::Channel;
use crate::entity::{BaseEntity, Entity};
use crate::error::Error;
use crate::store::{BaseEntityUpdate, EntityUpdate, Session, Store};
use crate::url::{Name, Reference};

//================================================================================================
// Impls
//================================================================================================

impl Store {
    /// Release the revision `url` identifies on each of `channels`.
    ///
    /// Every channel name is validated before anything is written: unknown
    /// names, `unpublished` and an empty list are all [`Error::InvalidRequest`].
    /// Releasing on the stable channel requests a search reindex of `url`.
    pub async fn publish<C: AsRef<str>>(
        &self,
        url: &Reference,
        channels: &[C],
    ) -> Result<(), Error> {
        let reindex = self.session().await?.publish(url, channels).await?;
        self.reindex(&reindex).await;
        Ok(())
    }

    /// Grant (`true`) or revoke (`false`) the promulgated alias for the name of
    /// the owned base URL `base`.
    ///
    /// Granting demotes every other owner of the name first. Revoking touches
    /// only `base`, warning when several other owners are still flagged. Either
    /// way the stable releases of every base entity touched are reindexed.
    pub async fn set_promulgated(&self, base: &Reference, promulgate: bool) -> Result<(), Error> {
        let reindex = self
            .session()
            .await?
            .set_promulgated(base, promulgate)
            .await?;
        self.reindex(&reindex).await;
        Ok(())
    }
}

impl Session<'_> {
    pub(crate) async fn publish<C: AsRef<str>>(
        &self,
        url: &Reference,
        channels: &[C],
    ) -> Result<BTreeSet<Reference>, Error> {
        let channels = release_channels(url, channels)?;
        let entity = self.find_entity(url).await?;
        let base = self.require_base(&entity.base_url).await?;
        let url = &entity.url;
        let series = entity.kind.series_keys();

        self.update_entity(url, EntityUpdate::Publish(channels.clone()))
            .await?
            .ok_or_else(|| Error::not_found(url))?;

        let before = self
            .update_base_entity(
                &base.url,
                BaseEntityUpdate::Point {
                    channels: channels.clone(),
                    series: series.clone(),
                    url: url.clone(),
                },
            )
            .await?
            .ok_or_else(|| Error::not_found(&base.url))?;

        let displaced: BTreeSet<(Channel, &Reference)> = channels
            .iter()
            .flat_map(|c| series.iter().filter_map(|s| before.pointer(*c, s).map(|r| (*c, r))))
            .filter(|(_, r)| *r != url)
            .collect();

        if !displaced.is_empty() {
            let after = self.require_base(&base.url).await?;
            for (channel, old) in displaced {
                if after.points_at(channel, old) {
                    continue;
                }
                self.update_entity(old, EntityUpdate::Unpublish(channel))
                    .await?;
                tracing::debug!(url = %old, %channel, "cleared displaced release");
            }
        }

        tracing::info!(%url, channels = ?channels, "published");

        let mut reindex = BTreeSet::new();
        if channels.contains(&Channel::Stable) {
            reindex.insert(url.clone());
        }
        Ok(reindex)
    }

    pub(crate) async fn set_promulgated(
        &self,
        base: &Reference,
        promulgate: bool,
    ) -> Result<BTreeSet<Reference>, Error> {
        if base.is_promulgated_namespace() {
            return Err(Error::invalid(format!(
                "{base}: only an owned base URL can be promulgated"
            )));
        }
        let target = self.require_base(&base.base_url()).await?;
        let mut touched = vec![target.clone()];

        if promulgate {
            touched.extend(self.demote_others(&target).await?);
            self.update_base_entity(&target.url, BaseEntityUpdate::Promulgated(true))
                .await?;
            self.assign_promulgated_revisions(&target).await?;
            tracing::info!(base = %target.url, "promulgated");
        } else {
            self.demote(&target).await?;
            tracing::info!(base = %target.url, "unpromulgated");
            let contested = self.flagged(&target.name).await?;
            if contested.len() > 1 {
                tracing::warn!(
                    name = %target.name,
                    owners = ?contested.iter().map(|b| b.url.to_string()).collect::<Vec<_>>(),
                    "name still promulgated by multiple owners"
                );
            }
        }

        Ok(touched.iter().flat_map(stable_releases).collect())
    }

    /// Demote every base entity other than `target` flagged promulgated for its
    /// name, returning them as they were.
    async fn demote_others(&self, target: &BaseEntity) -> Result<Vec<BaseEntity>, Error> {
        let flagged = self.flagged(&target.name).await?;
        let others: Vec<BaseEntity> = flagged
            .iter()
            .filter(|b| b.url != target.url)
            .cloned()
            .collect();

        if flagged.len() > 1 {
            tracing::warn!(
                name = %target.name,
                owners = ?flagged.iter().map(|b| b.url.to_string()).collect::<Vec<_>>(),
                "multiple promulgated owners, repairing"
            );
        }

        for other in &others {
            self.demote(other).await?;
            tracing::info!(base = %other.url, by = %target.url, "demoted promulgated owner");
        }
        Ok(others)
    }

    /// Every base entity for `name` currently flagged promulgated.
    async fn flagged(&self, name: &Name) -> Result<Vec<BaseEntity>, Error> {
        Ok(self
            .base_entities_named(name)
            .await?
            .into_iter()
            .filter(|b| b.promulgated)
            .collect())
    }

    /// Clear every promulgated mirror under `base`, then its flag.
    async fn demote(&self, base: &BaseEntity) -> Result<(), Error> {
        for entity in self.entities(&base.url).await? {
            if entity.promulgated_url.is_some() {
                self.update_entity(&entity.url, EntityUpdate::Promulgate(None))
                    .await?;
            }
        }
        self.update_base_entity(&base.url, BaseEntityUpdate::Promulgated(false))
            .await?;
        Ok(())
    }

    /// Give each entity under `base` lacking a promulgated revision a fresh one,
    /// in upload order. Revisions uploaded in the same instant go by owned revision.
    async fn assign_promulgated_revisions(&self, base: &BaseEntity) -> Result<(), Error> {
        let mut bare: Vec<Entity> = self
            .entities(&base.url)
            .await?
            .into_iter()
            .filter(|e| e.promulgated_url.is_none())
            .collect();
        bare.sort_by_key(|e| (e.upload_time, e.revision()));

        let Ok(count) = u32::try_from(bare.len()) else {
            return Err(Error::invalid(format!("{}: too many revisions", base.url)));
        };
        if count == 0 {
            return Ok(());
        }

        let first = self.reserve_promulgated_revisions(&base.name, count).await?;
        for (Entity { url, .. }, revision) in bare.iter().zip(first..) {
            let alias = url.promulgated(revision);
            tracing::debug!(%url, promulgated = %alias, "assigned promulgated revision");
            self.update_entity(url, EntityUpdate::Promulgate(Some(alias)))
                .await?;
        }
        Ok(())
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Parse and validate the requested channels. Nothing may be written if any is
/// unusable.
fn release_channels<C: AsRef<str>>(url: &Reference, names: &[C]) -> Result<Vec<Channel>, Error> {
    if names.is_empty() {
        return Err(Error::invalid(format!("{url}: no channel to publish to")));
    }
    let mut channels = BTreeSet::new();
    for name in names {
        let channel: Channel = name.as_ref().parse()?;
        if !channel.is_release() {
            return Err(Error::invalid(format!(
                "{url}: cannot publish to the {channel} channel"
            )));
        }
        channels.insert(channel);
    }
    Ok(channels.into_iter().collect())
}

/// The revisions `base` releases on the stable channel.
fn stable_releases(base: &BaseEntity) -> BTreeSet<Reference> {
    base.channel_entities
        .get(&Channel::Stable)
        .map(|pointers| pointers.values().cloned().collect())
        .unwrap_or_default()
}
