//! # Charm Crate
//!
//! The `charm` crate is the identity, resolution and publication engine of the
//! charm store: a backend holding versioned, immutable bundles ("charms" and
//! "bundles") under a two-level namespace of owning user and package name,
//! released through per-channel pointers and optionally aliased into a global,
//! user-less "promulgated" namespace.
//!
//! ## Key Concepts
//!
//! **References** ([`Reference`]) name an artifact, possibly partially:
//! `cs:~alice/trusty/foo-3` is fully qualified, while `cs:foo` names whatever the
//! promulgated owner of `foo` currently releases on the stable channel.
//!
//! **Entities** ([`Entity`]) are single immutable uploaded revisions. **Base
//! entities** ([`BaseEntity`]) are the per-(user, name) aggregate carrying ACLs,
//! the channel → series → revision pointers and the promulgation flag.
//!
//! ## Architecture
//!
//! - [`url`] - the reference type, its syntax and derivations.
//! - [`channel`] - release channels.
//! - [`entity`] - the persisted document types.
//! - [`store`] - the single-document [`store::Backend`] contract, its memory and
//!   filesystem implementations, and the [`Store`] facade.
//! - [`pool`] - bounded session admission.
//! - [`resolve`] - turning partial references into stored artifacts.
//! - [`publish`] - channel pointer and promulgation transitions.
//! - [`upload`], [`acl`], [`check`], [`migrate`], [`blob`], [`search`] - the
//!   surrounding write paths, permission model, invariant checker and
//!   collaborator interfaces.
//!
//! The backing store offers no multi-document atomicity. Every write issued here
//! updates exactly one document, and the multi-document operations are written so
//! that re-running them converges on the correct state.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use charm::store::memory::MemoryBackend;
//! use charm::{Channel, Reference, SessionPool, Store};
//!
//! # async fn run() -> Result<(), charm::Error> {
//! let store = Store::open(Arc::new(MemoryBackend::default()), SessionPool::default()).await?;
//! let url: Reference = "cs:~alice/trusty/foo-0".parse()?;
//! store.publish(&url, &[Channel::Stable]).await?;
//! let best = store.find_best_entity(&"cs:foo".parse()?).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub use self::channel::Channel;
pub use self::entity::{Acl, BaseEntity, BlobInfo, Entity, Kind};
pub use self::error::Error;
pub use self::pool::SessionPool;
pub use self::store::Store;
pub use self::url::{Name, Reference, Series, User};

pub mod acl;
pub mod blob;
pub mod channel;
pub mod check;
pub mod entity;
mod error;
pub mod migrate;
pub mod pool;
pub mod publish;
pub mod resolve;
pub mod search;
pub mod store;
#[cfg(test)]
mod testing;
pub mod upload;
pub mod url;

/// The base32 alphabet used for encoding content hashes.
const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648HexLower { padding: false };
/// The pseudo-series under which bundles are released.
const BUNDLE_SERIES: &str = "bundle";
/// The pseudo-group granting a permission to every caller.
pub const EVERYONE: &str = "everyone";
