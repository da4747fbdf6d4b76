//! # Upload Path
//!
//! Creation of new entity revisions. This is the only place entities come into
//! existence; afterwards they are immutable save for their release bookkeeping.
//!
//! A new revision is stored under its owner's base entity, which is created on
//! first upload with owner-only permissions on every channel. Revisions are
//! numbered per base URL across all series, so `cs:~alice/trusty/foo-3` and
//! `cs:~alice/xenial/foo-3` can never both exist. If the base entity currently
//! holds the promulgated alias, the revision receives the next promulgated
//! revision for its name at once.

use chrono::Utc;

use crate::entity::{BaseEntity, BlobInfo, Entity, Kind};
use crate::error::Error;
use crate::store::{EntityUpdate, Session, Store};
use crate::url::Reference;

impl Store {
    /// Store a new revision of `url`'s base entity.
    ///
    /// `url` must carry a user. Its series must agree with `kind`: a
    /// single-series charm names its only supported series, a multi-series charm
    /// names none, and a bundle names `bundle`. If `url` carries a revision that
    /// revision is used verbatim, otherwise the next free one is assigned.
    pub async fn add_revision(
        &self,
        url: &Reference,
        kind: Kind,
        blob: BlobInfo,
    ) -> Result<Entity, Error> {
        self.session().await?.add_revision(url, kind, blob).await
    }
}

impl Session<'_> {
    pub(crate) async fn add_revision(
        &self,
        url: &Reference,
        kind: Kind,
        blob: BlobInfo,
    ) -> Result<Entity, Error> {
        let Some(user) = url.user() else {
            return Err(Error::invalid(format!("{url}: uploads must name an owner")));
        };
        validate_kind(url, &kind)?;

        let base_url = url.base_url();
        let base = match self.base_entity(&base_url).await? {
            Some(base) => base,
            None => {
                let base = BaseEntity::new(user.clone(), url.name().clone());
                if self.insert_base_entity(base.clone()).await? {
                    tracing::info!(base = %base_url, "created base entity");
                    base
                } else {
                    self.require_base(&base_url).await?
                }
            },
        };

        let revision = match url.revision() {
            Some(revision) => revision,
            None => match self.entities(&base_url).await?.last() {
                Some(last) => last.revision().checked_add(1).ok_or_else(|| {
                    Error::Conflict(format!("{base_url}: no revision left after {}", last.url))
                })?,
                None => 0,
            },
        };

        let owned = base_url
            .clone()
            .with_series(url.series().cloned())
            .with_revision(Some(revision));

        let mut entity = Entity {
            url: owned.clone(),
            base_url,
            kind,
            blob,
            upload_time: Utc::now(),
            promulgated_url: None,
            published: Default::default(),
            extra_info: Default::default(),
        };

        if !self.insert_entity(entity.clone()).await? {
            return Err(Error::Conflict(format!("{owned} already exists")));
        }
        tracing::info!(url = %owned, "added revision");

        // A promulgation racing this upload may have raised the flag since the
        // first read; its scan cannot see a revision inserted after it ran.
        if base.promulgated || self.require_base(&entity.base_url).await?.promulgated {
            let first = self.reserve_promulgated_revisions(url.name(), 1).await?;
            let alias = owned.promulgated(first);
            self.update_entity(&owned, EntityUpdate::Promulgate(Some(alias.clone())))
                .await?;
            tracing::debug!(url = %owned, promulgated = %alias, "assigned promulgated revision");
            entity.promulgated_url = Some(alias);
        }

        Ok(entity)
    }
}

/// Check that the series in `url` agrees with what `kind` can be released under.
fn validate_kind(url: &Reference, kind: &Kind) -> Result<(), Error> {
    let series = url.series();
    let ok = match kind {
        Kind::Bundle { .. } => series.is_some_and(|s| s.is_bundle()),
        Kind::Charm {
            supported_series, ..
        } => match series {
            Some(s) => {
                !s.is_bundle() && supported_series.as_slice() == std::slice::from_ref(s)
            },
            None => {
                !supported_series.is_empty() && !supported_series.iter().any(|s| s.is_bundle())
            },
        },
    };
    if ok {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "{url}: series does not agree with the uploaded {}",
            if kind.is_bundle() { "bundle" } else { "charm" }
        )))
    }
}
