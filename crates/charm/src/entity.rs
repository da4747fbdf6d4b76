//! # Stored Documents
//!
//! The two document kinds the engine persists: [`Entity`], one immutable uploaded
//! revision, and [`BaseEntity`], the per-(user, name) aggregate holding ACLs,
//! release pointers and the promulgation flag.
//!
//! Neither document is ever deleted. After creation an entity only sees its
//! `published` flags, its promulgated mirror and its free-form annotations change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::url::{Name, Reference, Series, User};

//================================================================================================
// Types
//================================================================================================

/// The opaque blob-store descriptors of an artifact's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// The handle the blob store hands back on `put`.
    pub handle: String,
    /// The content hash.
    pub hash: String,
    /// The content size in bytes.
    pub size: u64,
}

/// Charm specific metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CharmMeta {
    /// One line summary.
    #[serde(default)]
    pub summary: String,
    /// Whether the charm is a subordinate.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub subordinate: bool,
}

/// Bundle specific metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BundleMeta {
    /// The charms the bundle deploys, keyed by application name.
    #[serde(default)]
    pub applications: BTreeMap<String, Reference>,
}

/// What an artifact is: a charm supporting a set of series, or a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Kind {
    /// A charm. Single-series charms support exactly the series in their URL.
    Charm {
        /// Every series the charm can be deployed to.
        supported_series: Vec<Series>,
        /// Charm metadata.
        #[serde(default)]
        meta: CharmMeta,
    },
    /// A bundle, released under the `bundle` pseudo-series.
    Bundle {
        /// Bundle metadata.
        #[serde(default)]
        meta: BundleMeta,
    },
}

/// One immutable, content-addressed artifact revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// The exact, owned URL. Never changes once assigned.
    pub url: Reference,
    /// The structural strip of `url`, denormalized for grouping.
    pub base_url: Reference,
    /// What the artifact is.
    #[serde(flatten)]
    pub kind: Kind,
    /// Where the content lives.
    pub blob: BlobInfo,
    /// When the revision was uploaded.
    pub upload_time: DateTime<Utc>,
    /// The user-less alias of this revision, present only while its base entity
    /// is promulgated. The promulgated revision is this URL's revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promulgated_url: Option<Reference>,
    /// Which channels currently point at this exact revision.
    #[serde(default)]
    pub published: BTreeMap<Channel, bool>,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_info: BTreeMap<String, serde_json::Value>,
}

/// Read and write permissions for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Acl {
    /// Users and groups allowed to read.
    #[serde(default)]
    pub read: Vec<String>,
    /// Users and groups allowed to write.
    #[serde(default)]
    pub write: Vec<String>,
}

/// Channel → series → released revision.
pub type ChannelEntities = BTreeMap<Channel, BTreeMap<Series, Reference>>;

/// The per-(user, name) aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEntity {
    /// The base URL this aggregate groups.
    pub url: Reference,
    /// The owner.
    pub user: User,
    /// The package name.
    pub name: Name,
    /// Whether this owner currently holds the user-less alias for `name`.
    #[serde(default)]
    pub promulgated: bool,
    /// Channel scoped permissions, materialized per channel.
    #[serde(default)]
    pub acls: BTreeMap<Channel, Acl>,
    /// The revision currently released per channel and series. Never keyed by
    /// `Unpublished`.
    #[serde(default)]
    pub channel_entities: ChannelEntities,
}

//================================================================================================
// Impls
//================================================================================================

impl Kind {
    /// The series keys this artifact is released under: its supported series,
    /// or `bundle` for bundles.
    pub fn series_keys(&self) -> Vec<Series> {
        match self {
            Kind::Charm {
                supported_series, ..
            } => supported_series.clone(),
            Kind::Bundle { .. } => vec![Series::bundle()],
        }
    }

    /// Whether the artifact can be released under `series`.
    pub fn supports(&self, series: &Series) -> bool {
        match self {
            Kind::Charm {
                supported_series, ..
            } => supported_series.contains(series),
            Kind::Bundle { .. } => series.is_bundle(),
        }
    }

    /// Whether this is a bundle.
    pub fn is_bundle(&self) -> bool {
        matches!(self, Kind::Bundle { .. })
    }
}

impl Entity {
    /// The promulgated revision, if the entity currently has an alias.
    pub fn promulgated_revision(&self) -> Option<u32> {
        self.promulgated_url.as_ref().and_then(Reference::revision)
    }

    /// The owned revision.
    pub fn revision(&self) -> u32 {
        self.url.revision().unwrap_or_default()
    }

    /// Whether a channel pointer currently references this revision.
    pub fn is_published(&self, channel: Channel) -> bool {
        self.published.get(&channel).copied().unwrap_or(false)
    }

    /// Whether a series constraint is satisfied: either the URL's own series, or
    /// any supported series of a multi-series charm.
    pub fn matches_series(&self, series: &Series) -> bool {
        match self.url.series() {
            Some(own) => own == series,
            None => self.kind.supports(series),
        }
    }
}

impl Acl {
    /// An ACL granting both permissions to the given principals.
    pub fn owner(user: &User) -> Self {
        Acl {
            read: vec![user.to_string()],
            write: vec![user.to_string()],
        }
    }

    /// Whether any of the caller's principals may read.
    pub fn can_read<S: AsRef<str>>(&self, principals: &[S]) -> bool {
        allows(&self.read, principals)
    }

    /// Whether any of the caller's principals may write.
    pub fn can_write<S: AsRef<str>>(&self, principals: &[S]) -> bool {
        allows(&self.write, principals)
    }
}

impl BaseEntity {
    /// A fresh aggregate for `user`'s `name`, with owner-only ACLs materialized on
    /// every channel and nothing released.
    pub fn new(user: User, name: Name) -> Self {
        let acls = Channel::ALL
            .into_iter()
            .map(|c| (c, Acl::owner(&user)))
            .collect();
        BaseEntity {
            url: Reference::new(name.clone()).with_user(Some(user.clone())),
            user,
            name,
            promulgated: false,
            acls,
            channel_entities: BTreeMap::new(),
        }
    }

    /// The revision released on `channel` under `series`.
    pub fn pointer(&self, channel: Channel, series: &Series) -> Option<&Reference> {
        self.channel_entities.get(&channel)?.get(series)
    }

    /// Whether any series on `channel` points at `url`.
    pub fn points_at(&self, channel: Channel, url: &Reference) -> bool {
        self.channel_entities
            .get(&channel)
            .is_some_and(|m| m.values().any(|r| r == url))
    }
}

//================================================================================================
// Functions
//================================================================================================

fn allows<S: AsRef<str>>(granted: &[String], principals: &[S]) -> bool {
    granted.iter().any(|g| {
        g == crate::EVERYONE || principals.iter().any(|p| p.as_ref() == g.as_str())
    })
}
