//! # Channel Scoped Permissions
//!
//! Every base entity carries one [`Acl`] per channel, materialized at write
//! time: setting permissions writes the same record under each channel the
//! request names, and a check is a single lookup with no inheritance. The
//! `unpublished` entry governs revisions not released anywhere.
//!
//! Principals are plain strings: a user name or a group. The [`EVERYONE`]
//! group grants a permission to every caller.
//!
//! [`EVERYONE`]: crate::EVERYONE

use crate::channel::Channel;
use crate::entity::Acl;
use crate::error::Error;
use crate::store::{BaseEntityUpdate, Store};
use crate::url::Reference;

impl Store {
    /// Replace the permissions of `base` on every channel named.
    pub async fn set_acl<C: AsRef<str>>(
        &self,
        base: &Reference,
        channels: &[C],
        acl: Acl,
    ) -> Result<(), Error> {
        if channels.is_empty() {
            return Err(Error::invalid(format!("{base}: no channel to set permissions on")));
        }
        let channels = channels
            .iter()
            .map(|c| c.as_ref().parse())
            .collect::<Result<Vec<Channel>, _>>()?;

        let url = owned_base(base)?;
        self.session()
            .await?
            .update_base_entity(&url, BaseEntityUpdate::Acl {
                channels: channels.clone(),
                acl,
            })
            .await?
            .ok_or_else(|| Error::not_found(&url))?;

        tracing::info!(base = %url, ?channels, "updated permissions");
        Ok(())
    }

    /// The permissions of `base` on `channel`. A channel never written grants
    /// nothing.
    pub async fn acl(&self, base: &Reference, channel: Channel) -> Result<Acl, Error> {
        let url = owned_base(base)?;
        let base = self.session().await?.require_base(&url).await?;
        Ok(base.acls.get(&channel).cloned().unwrap_or_default())
    }

    /// Whether any of `principals` may read `base` on `channel`.
    pub async fn can_read<S: AsRef<str>>(
        &self,
        base: &Reference,
        channel: Channel,
        principals: &[S],
    ) -> Result<bool, Error> {
        Ok(self.acl(base, channel).await?.can_read(principals))
    }

    /// Whether any of `principals` may write `base` on `channel`.
    pub async fn can_write<S: AsRef<str>>(
        &self,
        base: &Reference,
        channel: Channel,
        principals: &[S],
    ) -> Result<bool, Error> {
        Ok(self.acl(base, channel).await?.can_write(principals))
    }
}

fn owned_base(url: &Reference) -> Result<Reference, Error> {
    if url.is_promulgated_namespace() {
        return Err(Error::invalid(format!("{url}: permissions belong to an owner")));
    }
    Ok(url.base_url())
}
