//! Fixtures shared by the unit tests of the engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::entity::{BlobInfo, BundleMeta, CharmMeta, Entity, Kind};
use crate::search::Reindex;
use crate::store::memory::MemoryBackend;
use crate::url::{Reference, Series};
use crate::{SessionPool, Store};

/// Reindex hook remembering every request.
#[derive(Debug, Default)]
pub(crate) struct Recorder(Mutex<Vec<Reference>>);

impl Recorder {
    pub(crate) fn take(&self) -> Vec<String> {
        let mut urls: Vec<String> = std::mem::take(&mut *self.0.lock().unwrap())
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl Reindex for Recorder {
    async fn reindex(&self, url: &Reference) {
        self.0.lock().unwrap().push(url.clone());
    }
}

pub(crate) fn charm(series: &[&str]) -> Kind {
    Kind::Charm {
        supported_series: series.iter().map(|s| s.parse::<Series>().unwrap()).collect(),
        meta: CharmMeta::default(),
    }
}

pub(crate) fn bundle() -> Kind {
    Kind::Bundle {
        meta: BundleMeta::default(),
    }
}

pub(crate) fn blob(content: &str) -> BlobInfo {
    BlobInfo {
        handle: crate::blob::hash(content.as_bytes()),
        hash: crate::blob::hash(content.as_bytes()),
        size: content.len() as u64,
    }
}

pub(crate) fn url(s: &str) -> Reference {
    s.parse().unwrap()
}

/// An empty in-memory store at the current schema.
pub(crate) async fn store() -> Store {
    Store::open(
        Arc::new(MemoryBackend::default()),
        SessionPool::new(8, Duration::from_secs(5)),
    )
    .await
    .unwrap()
}

/// An empty in-memory store whose reindex requests are recorded.
pub(crate) async fn recorded() -> (Store, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let store = store().await.with_search(recorder.clone());
    (store, recorder)
}

/// Upload a revision of `url`, a single-series charm or bundle depending on its
/// series, or a multi-series charm supporting `supported` when it has none.
pub(crate) async fn upload(store: &Store, s: &str, supported: &[&str]) -> Entity {
    let url = url(s);
    let kind = match url.series() {
        Some(series) if series.is_bundle() => bundle(),
        Some(series) => charm(&[&**series]),
        None => charm(supported),
    };
    store.add_revision(&url, kind, blob(s)).await.unwrap()
}
