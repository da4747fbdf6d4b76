use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use crate::entity::{BaseEntity, Entity};
use crate::error::Error;
use crate::store::memory::MemoryBackend;
use crate::store::{Backend, BackendError, BaseEntityUpdate, EntityUpdate};
use crate::testing::{recorded, store, upload, url};
use crate::url::{Name, Reference};
use crate::{Channel, SessionPool, Store};

//================================================================================================
// Fixtures
//================================================================================================

/// A backend that fails every write once its budget is spent.
#[derive(Debug)]
struct Flaky {
    inner: MemoryBackend,
    budget: AtomicUsize,
}

impl Flaky {
    fn new() -> Self {
        Flaky {
            inner: MemoryBackend::default(),
            budget: AtomicUsize::new(usize::MAX),
        }
    }

    fn limit(&self, writes: usize) {
        self.budget.store(writes, Ordering::SeqCst);
    }

    fn spend(&self) -> Result<(), BackendError> {
        self.budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(drop)
            .map_err(|_| BackendError::Io(std::io::Error::other("injected write failure")))
    }
}

#[async_trait]
impl Backend for Flaky {
    async fn revision(&self, base: &Reference, rev: u32) -> Result<Option<Entity>, BackendError> {
        self.inner.revision(base, rev).await
    }

    async fn entities(&self, base: &Reference) -> Result<Vec<Entity>, BackendError> {
        self.inner.entities(base).await
    }

    async fn insert_entity(&self, entity: Entity) -> Result<bool, BackendError> {
        self.spend()?;
        self.inner.insert_entity(entity).await
    }

    async fn update_entity(
        &self,
        url: &Reference,
        update: EntityUpdate,
    ) -> Result<Option<Entity>, BackendError> {
        self.spend()?;
        self.inner.update_entity(url, update).await
    }

    async fn base_entity(&self, url: &Reference) -> Result<Option<BaseEntity>, BackendError> {
        self.inner.base_entity(url).await
    }

    async fn base_entities_named(&self, name: &Name) -> Result<Vec<BaseEntity>, BackendError> {
        self.inner.base_entities_named(name).await
    }

    async fn all_base_entities(&self) -> Result<Vec<BaseEntity>, BackendError> {
        self.inner.all_base_entities().await
    }

    async fn insert_base_entity(&self, base: BaseEntity) -> Result<bool, BackendError> {
        self.spend()?;
        self.inner.insert_base_entity(base).await
    }

    async fn update_base_entity(
        &self,
        url: &Reference,
        update: BaseEntityUpdate,
    ) -> Result<Option<BaseEntity>, BackendError> {
        self.spend()?;
        self.inner.update_base_entity(url, update).await
    }

    async fn reserve_promulgated_revisions(
        &self,
        name: &Name,
        count: u32,
    ) -> Result<u32, BackendError> {
        self.spend()?;
        self.inner.reserve_promulgated_revisions(name, count).await
    }

    async fn executed_migrations(&self) -> Result<BTreeSet<String>, BackendError> {
        self.inner.executed_migrations().await
    }
}

async fn base(store: &Store, s: &str) -> BaseEntity {
    store
        .session()
        .await
        .unwrap()
        .base_entity(&url(s))
        .await
        .unwrap()
        .unwrap()
}

async fn entity(store: &Store, s: &str) -> Entity {
    store.find_entity(&url(s)).await.unwrap()
}

async fn mirrors(store: &Store, owner: &str) -> Vec<Option<String>> {
    let session = store.session().await.unwrap();
    session
        .entities(&url(owner))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.promulgated_url.map(|u| u.to_string()))
        .collect()
}

async fn promulgated_owners(store: &Store, name: &str) -> Vec<String> {
    let session = store.session().await.unwrap();
    session
        .base_entities_named(&name.parse().unwrap())
        .await
        .unwrap()
        .into_iter()
        .filter(|b| b.promulgated)
        .map(|b| b.url.to_string())
        .collect()
}

//================================================================================================
// Publish
//================================================================================================

#[tokio::test]
async fn publish_round_trips_through_resolution() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    upload(&store, "~alice/trusty/foo", &[]).await;

    for (revision, channel) in [(1, Channel::Edge), (0, Channel::Candidate)] {
        let published = url(&format!("~alice/trusty/foo-{revision}"));
        store.publish(&published, &[channel]).await?;
        let best = store
            .find_best_entity(&url("foo").with_channel(Some(channel)))
            .await?;
        assert_eq!(best.url, published);
        assert!(best.is_published(channel));
    }
    assert!(store.check_invariants().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_channels_write_nothing() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    store.publish(&url("~alice/trusty/foo-0"), &["edge"]).await?;
    let before = base(&store, "~alice/foo").await;

    let rejected: [&[&str]; 4] = [&["stable", "nightly"], &["unpublished"], &["Stable"], &[]];
    for channels in rejected {
        let err = store
            .publish(&url("~alice/trusty/foo-0"), channels)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)), "{channels:?}: {err}");
    }

    // Channels are checked before the revision is even looked up.
    let err = store
        .publish(&url("~alice/trusty/foo-9"), &["nightly"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)), "{err}");

    assert_eq!(base(&store, "~alice/foo").await, before);
    assert!(!entity(&store, "~alice/trusty/foo-0").await.is_published(Channel::Stable));
    Ok(())
}

#[tokio::test]
async fn publishing_missing_revisions_is_not_found() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    for missing in ["~alice/trusty/foo-1", "~bob/trusty/foo-0", "~alice/xenial/foo-0"] {
        let err = store.publish(&url(missing), &["stable"]).await.unwrap_err();
        assert!(err.is_not_found(), "{missing}: {err}");
    }
    let err = store
        .publish(&url("~alice/trusty/foo"), &["stable"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)), "{err}");
    Ok(())
}

#[tokio::test]
async fn displaced_revisions_lose_their_flag() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    store
        .publish(&url("~alice/trusty/foo-0"), &["stable", "beta"])
        .await?;
    store.publish(&url("~alice/trusty/foo-1"), &["stable"]).await?;

    let old = entity(&store, "~alice/trusty/foo-0").await;
    assert!(!old.is_published(Channel::Stable));
    assert!(old.is_published(Channel::Beta), "beta still points at it");
    assert!(entity(&store, "~alice/trusty/foo-1").await.is_published(Channel::Stable));
    assert!(store.check_invariants().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn partially_displaced_revisions_stay_flagged() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/foo", &["trusty", "xenial"]).await;
    upload(&store, "~alice/xenial/foo", &[]).await;
    store.publish(&url("~alice/foo-0"), &["stable"]).await?;
    store.publish(&url("~alice/xenial/foo-1"), &["stable"]).await?;

    let base = base(&store, "~alice/foo").await;
    let trusty = "trusty".parse()?;
    let xenial = "xenial".parse()?;
    assert_eq!(base.pointer(Channel::Stable, &trusty), Some(&url("~alice/foo-0")));
    assert_eq!(base.pointer(Channel::Stable, &xenial), Some(&url("~alice/xenial/foo-1")));
    assert!(entity(&store, "~alice/foo-0").await.is_published(Channel::Stable));
    assert!(store.check_invariants().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn bundles_release_under_the_bundle_series() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/bundle/wiki", &[]).await;
    store.publish(&url("~alice/bundle/wiki-0"), &["stable"]).await?;
    let base = base(&store, "~alice/wiki").await;
    assert_eq!(
        base.pointer(Channel::Stable, &crate::Series::bundle()),
        Some(&url("~alice/bundle/wiki-0"))
    );
    let found = store.find_best_entity(&url("wiki")).await?;
    assert!(found.kind.is_bundle());
    Ok(())
}

// Publishing an older revision over a newer one rolls the channel back. There is
// deliberately no revision ordering check.
#[tokio::test]
async fn older_revisions_may_roll_a_channel_back() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    store.publish(&url("~alice/trusty/foo-1"), &["stable"]).await?;
    store.publish(&url("~alice/trusty/foo-0"), &["stable"]).await?;

    let best = store.find_best_entity(&url("~alice/foo")).await?;
    assert_eq!(best.revision(), 0);
    assert!(!entity(&store, "~alice/trusty/foo-1").await.is_published(Channel::Stable));
    Ok(())
}

#[tokio::test]
async fn promulgated_urls_can_be_published() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    store.set_promulgated(&url("~alice/foo"), true).await?;
    store.publish(&url("cs:trusty/foo-0"), &["stable"]).await?;
    let best = store.find_best_entity(&url("foo")).await?;
    assert_eq!(best.url.to_string(), "cs:~alice/trusty/foo-0");
    Ok(())
}

#[tokio::test]
async fn only_stable_releases_are_reindexed() -> anyhow::Result<()> {
    let (store, recorder) = recorded().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    store.publish(&url("~alice/trusty/foo-0"), &["edge"]).await?;
    assert!(recorder.take().is_empty());
    store
        .publish(&url("~alice/trusty/foo-0"), &["edge", "stable"])
        .await?;
    assert_eq!(recorder.take(), ["cs:~alice/trusty/foo-0"]);
    Ok(())
}

//================================================================================================
// Promulgation
//================================================================================================

#[tokio::test]
async fn promulgation_moves_between_owners() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    upload(&store, "~alice/foo", &["trusty", "xenial"]).await;
    upload(&store, "~bob/trusty/foo", &[]).await;

    store.set_promulgated(&url("~alice/foo"), true).await?;
    assert!(base(&store, "~alice/foo").await.promulgated);
    assert_eq!(mirrors(&store, "~alice/foo").await, [
        Some("cs:trusty/foo-0".to_owned()),
        Some("cs:foo-1".to_owned()),
    ]);

    store.set_promulgated(&url("~bob/foo"), true).await?;
    assert!(!base(&store, "~alice/foo").await.promulgated);
    assert!(base(&store, "~bob/foo").await.promulgated);
    assert_eq!(mirrors(&store, "~alice/foo").await, [None, None]);
    assert_eq!(mirrors(&store, "~bob/foo").await, [Some("cs:trusty/foo-2".to_owned())]);
    assert!(store.check_invariants().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn promulgating_twice_changes_nothing() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    upload(&store, "~alice/trusty/foo", &[]).await;

    store.set_promulgated(&url("~alice/foo"), true).await?;
    let once = (base(&store, "~alice/foo").await, mirrors(&store, "~alice/foo").await);
    store.set_promulgated(&url("~alice/foo"), true).await?;
    let twice = (base(&store, "~alice/foo").await, mirrors(&store, "~alice/foo").await);
    assert_eq!(once, twice);
    Ok(())
}

#[tokio::test]
async fn promulgated_revisions_follow_upload_order() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo-5", &[]).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    upload(&store, "~alice/trusty/foo-2", &[]).await;

    store.set_promulgated(&url("~alice/foo"), true).await?;
    // Listed by owned revision: foo-2 was uploaded last.
    assert_eq!(mirrors(&store, "~alice/foo").await, [
        Some("cs:trusty/foo-1".to_owned()),
        Some("cs:trusty/foo-0".to_owned()),
    ]);
    Ok(())
}

#[tokio::test]
async fn revoking_never_reuses_revisions() -> anyhow::Result<()> {
    let store = store().await;
    upload(&store, "~alice/trusty/foo", &[]).await;

    store.set_promulgated(&url("~alice/foo"), true).await?;
    assert_eq!(mirrors(&store, "~alice/foo").await, [Some("cs:trusty/foo-0".to_owned())]);
    store.set_promulgated(&url("~alice/foo"), false).await?;
    assert!(!base(&store, "~alice/foo").await.promulgated);
    assert_eq!(mirrors(&store, "~alice/foo").await, [None]);
    store.set_promulgated(&url("~alice/foo"), true).await?;
    assert_eq!(mirrors(&store, "~alice/foo").await, [Some("cs:trusty/foo-1".to_owned())]);
    Ok(())
}

#[tokio::test]
async fn stale_promulgations_are_repaired() -> anyhow::Result<()> {
    let store = store().await;
    for owner in ["~alice/trusty/foo", "~bob/trusty/foo", "~carol/trusty/foo"] {
        upload(&store, owner, &[]).await;
    }
    store.set_promulgated(&url("~alice/foo"), true).await?;
    // Leave bob flagged as an interrupted earlier grant would.
    store
        .session()
        .await?
        .update_base_entity(&url("~bob/foo"), BaseEntityUpdate::Promulgated(true))
        .await?;
    assert_eq!(promulgated_owners(&store, "foo").await, ["cs:~alice/foo", "cs:~bob/foo"]);

    store.set_promulgated(&url("~carol/foo"), true).await?;
    assert_eq!(promulgated_owners(&store, "foo").await, ["cs:~carol/foo"]);
    assert_eq!(mirrors(&store, "~alice/foo").await, [None]);
    assert!(store.check_invariants().await?.is_empty());
    Ok(())
}

#[derive(Clone, Default)]
struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn revoking_warns_about_contested_names() -> anyhow::Result<()> {
    let store = store().await;
    for owner in ["~alice/trusty/foo", "~bob/trusty/foo", "~carol/trusty/foo"] {
        upload(&store, owner, &[]).await;
    }
    store.set_promulgated(&url("~alice/foo"), true).await?;
    {
        let session = store.session().await?;
        for owner in ["~bob/foo", "~carol/foo"] {
            session
                .update_base_entity(&url(owner), BaseEntityUpdate::Promulgated(true))
                .await?;
        }
    }

    let logs = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    store.set_promulgated(&url("~alice/foo"), false).await?;
    drop(guard);

    // Neither remaining owner can be preferred, so both stay and are named.
    let logs = String::from_utf8(logs.0.lock().unwrap().clone())?;
    assert!(logs.contains("still promulgated by multiple owners"), "{logs}");
    assert!(logs.contains("cs:~bob/foo") && logs.contains("cs:~carol/foo"), "{logs}");
    assert!(!logs.contains("cs:~alice/foo"), "{logs}");
    assert_eq!(promulgated_owners(&store, "foo").await, ["cs:~bob/foo", "cs:~carol/foo"]);
    assert_eq!(mirrors(&store, "~alice/foo").await, [None]);
    Ok(())
}

#[tokio::test]
async fn promulgation_targets_must_exist() -> anyhow::Result<()> {
    let store = store().await;
    let err = store
        .set_promulgated(&url("~alice/foo"), true)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
    let err = store.set_promulgated(&url("foo"), true).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)), "{err}");
    Ok(())
}

#[tokio::test]
async fn promulgation_reindexes_every_touched_owner() -> anyhow::Result<()> {
    let (store, recorder) = recorded().await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    upload(&store, "~bob/xenial/foo", &[]).await;
    store.publish(&url("~alice/trusty/foo-0"), &["stable"]).await?;
    store.publish(&url("~bob/xenial/foo-0"), &["stable"]).await?;
    store.set_promulgated(&url("~alice/foo"), true).await?;
    recorder.take();

    store.set_promulgated(&url("~bob/foo"), true).await?;
    assert_eq!(recorder.take(), ["cs:~alice/trusty/foo-0", "cs:~bob/xenial/foo-0"]);
    Ok(())
}

#[tokio::test]
async fn interrupted_promulgation_converges_on_retry() -> anyhow::Result<()> {
    let backend = Arc::new(Flaky::new());
    let store = Store::open(backend.clone(), SessionPool::new(4, Duration::from_secs(5))).await?;
    upload(&store, "~alice/trusty/foo", &[]).await;
    upload(&store, "~alice/trusty/foo", &[]).await;
    upload(&store, "~bob/trusty/foo", &[]).await;
    store.set_promulgated(&url("~alice/foo"), true).await?;

    // Demote one of alice's mirrors, then fail.
    backend.limit(1);
    let err = store.set_promulgated(&url("~bob/foo"), true).await.unwrap_err();
    assert!(matches!(err, Error::Backend(_)), "{err}");
    backend.limit(usize::MAX);
    assert_eq!(mirrors(&store, "~alice/foo").await, [None, Some("cs:trusty/foo-1".to_owned())]);

    store.set_promulgated(&url("~bob/foo"), true).await?;
    assert_eq!(promulgated_owners(&store, "foo").await, ["cs:~bob/foo"]);
    assert!(store.check_invariants().await?.is_empty());
    Ok(())
}

//================================================================================================
// Convergence
//================================================================================================

const OWNERS: [&str; 3] = ["~alice/foo", "~bob/foo", "~carol/foo"];

async fn converge(ops: Vec<(usize, bool, usize)>) -> anyhow::Result<()> {
    let backend = Arc::new(Flaky::new());
    let store = Store::open(backend.clone(), SessionPool::new(4, Duration::from_secs(5))).await?;
    for owner in ["~alice/trusty/foo", "~bob/trusty/foo", "~carol/xenial/foo"] {
        upload(&store, owner, &[]).await;
        upload(&store, owner, &[]).await;
    }
    store.publish(&url("~alice/trusty/foo-1"), &["stable"]).await?;
    store.publish(&url("~carol/xenial/foo-0"), &["stable"]).await?;

    for (owner, promulgate, writes) in ops {
        let target = url(OWNERS[owner]);
        backend.limit(writes);
        let attempt = store.set_promulgated(&target, promulgate).await;
        backend.limit(usize::MAX);
        if let Err(err) = attempt {
            assert!(matches!(err, Error::Backend(_)), "{err}");
            store.set_promulgated(&target, promulgate).await?;
        }

        let flagged = promulgated_owners(&store, "foo").await;
        assert!(flagged.len() <= 1, "{flagged:?}");
        assert_eq!(flagged.contains(&target.to_string()), promulgate);
        assert!(store.check_invariants().await?.is_empty());

        let mut seen = BTreeSet::new();
        for owner in OWNERS {
            let aliases = mirrors(&store, owner).await;
            let flagged = flagged.contains(&url(owner).to_string());
            for alias in aliases {
                assert_eq!(alias.is_some(), flagged, "{owner}: {alias:?}");
                if let Some(alias) = alias {
                    assert!(seen.insert(alias.clone()), "{alias} handed out twice");
                }
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn promulgation_converges(
        ops in prop::collection::vec((0..3usize, any::<bool>(), 0..8usize), 1..10)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(converge(ops)).unwrap();
    }
}
