//! # Filesystem Backend
//!
//! Persists one JSON document per file beneath a root directory:
//!
//! ```text
//! <root>/migrations.json
//! <root>/base/<user>/<name>.json
//! <root>/entities/<user>/<name>/<revision>.json
//! <root>/counters/<name>.json
//! ```
//!
//! Every write serializes into a temporary file in the target's directory and is
//! then persisted over the target by rename, so readers only ever observe a
//! complete document. Read-modify-write cycles are serialized per collection.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::{Backend, BackendError, BaseEntityUpdate, EntityUpdate};
use crate::entity::{BaseEntity, Entity};
use crate::url::{Name, Reference};

const BASE_DIR: &str = "base";
const COUNTER_DIR: &str = "counters";
const ENTITY_DIR: &str = "entities";
const JSON: &str = "json";
const MIGRATIONS: &str = "migrations.json";

//================================================================================================
// Types
//================================================================================================

/// A [`Backend`] storing documents as files under a root directory.
#[derive(Debug)]
pub struct FsBackend {
    layout: Arc<Layout>,
    entities: Mutex<()>,
    bases: Mutex<()>,
    counters: Mutex<()>,
}

#[derive(Debug)]
struct Layout {
    root: PathBuf,
}

#[derive(serde::Deserialize, Serialize, Default)]
struct Counter {
    next: u32,
}

//================================================================================================
// Impls
//================================================================================================

impl FsBackend {
    /// Open the store rooted at `root`, creating it if needed. A freshly created
    /// store starts at the current schema, recording every known migration.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let layout = Arc::new(Layout { root: root.into() });
        let init = Arc::clone(&layout);
        blocking(move || {
            for dir in [BASE_DIR, COUNTER_DIR, ENTITY_DIR] {
                std::fs::create_dir_all(init.root.join(dir))?;
            }
            let migrations = init.root.join(MIGRATIONS);
            if !migrations.exists() && init.is_empty()? {
                let known: BTreeSet<&str> = crate::migrate::KNOWN.iter().copied().collect();
                write_doc(&migrations, &known)?;
                tracing::info!(root = %init.root.display(), "initialized new charm store");
            }
            Ok(())
        })
        .await?;

        Ok(FsBackend {
            layout,
            entities: Mutex::default(),
            bases: Mutex::default(),
            counters: Mutex::default(),
        })
    }

    /// The root directory of the store.
    pub fn root(&self) -> &Path {
        &self.layout.root
    }
}

impl Layout {
    fn is_empty(&self) -> io::Result<bool> {
        Ok(std::fs::read_dir(self.root.join(BASE_DIR))?.next().is_none())
    }

    fn base_path(&self, url: &Reference) -> Option<PathBuf> {
        let user = url.user()?;
        Some(
            self.root
                .join(BASE_DIR)
                .join(&**user)
                .join(format!("{}.{JSON}", url.name())),
        )
    }

    fn entity_dir(&self, base: &Reference) -> Option<PathBuf> {
        let user = base.user()?;
        Some(
            self.root
                .join(ENTITY_DIR)
                .join(&**user)
                .join(&**base.name()),
        )
    }

    fn entity_path(&self, base: &Reference, revision: u32) -> Option<PathBuf> {
        Some(self.entity_dir(base)?.join(format!("{revision}.{JSON}")))
    }

    fn counter_path(&self, name: &Name) -> PathBuf {
        self.root.join(COUNTER_DIR).join(format!("{name}.{JSON}"))
    }

    fn read_entity(&self, url: &Reference) -> Result<Option<(PathBuf, Entity)>, BackendError> {
        let Some(path) = url
            .revision()
            .and_then(|rev| self.entity_path(&url.base_url(), rev))
        else {
            return Ok(None);
        };
        Ok(read_doc::<Entity>(&path)?
            .filter(|e| &e.url == url)
            .map(|e| (path, e)))
    }

    fn list_entities(&self, base: &Reference) -> Result<Vec<Entity>, BackendError> {
        let Some(dir) = self.entity_dir(base) else {
            return Ok(Vec::new());
        };
        let mut entities = Vec::new();
        for path in json_files(&dir)? {
            let entity: Entity =
                read_doc(&path)?.ok_or_else(|| BackendError::Corrupt(path.display().to_string()))?;
            entities.push(entity);
        }
        entities.sort_by_key(Entity::revision);
        Ok(entities)
    }

    fn list_bases(&self, name: Option<&Name>) -> Result<Vec<BaseEntity>, BackendError> {
        let mut bases = Vec::new();
        for user_dir in dirs(&self.root.join(BASE_DIR))? {
            let files = match name {
                Some(name) => vec![user_dir.join(format!("{name}.{JSON}"))],
                None => json_files(&user_dir)?,
            };
            for path in files {
                if let Some(base) = read_doc::<BaseEntity>(&path)? {
                    bases.push(base);
                }
            }
        }
        bases.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(bases)
    }
}

#[async_trait]
impl Backend for FsBackend {
    async fn revision(
        &self,
        base: &Reference,
        revision: u32,
    ) -> Result<Option<Entity>, BackendError> {
        let layout = Arc::clone(&self.layout);
        let base = base.base_url();
        blocking(move || match layout.entity_path(&base, revision) {
            Some(path) => read_doc(&path),
            None => Ok(None),
        })
        .await
    }

    async fn entities(&self, base: &Reference) -> Result<Vec<Entity>, BackendError> {
        let layout = Arc::clone(&self.layout);
        let base = base.base_url();
        blocking(move || layout.list_entities(&base)).await
    }

    async fn insert_entity(&self, entity: Entity) -> Result<bool, BackendError> {
        let _guard = self.entities.lock().await;
        let layout = Arc::clone(&self.layout);
        blocking(move || {
            let path = entity
                .url
                .revision()
                .and_then(|rev| layout.entity_path(&entity.base_url, rev))
                .ok_or_else(|| BackendError::Corrupt(entity.url.to_string()))?;
            if path.exists() {
                return Ok(false);
            }
            write_doc(&path, &entity)?;
            Ok(true)
        })
        .await
    }

    async fn update_entity(
        &self,
        url: &Reference,
        update: EntityUpdate,
    ) -> Result<Option<Entity>, BackendError> {
        let _guard = self.entities.lock().await;
        let layout = Arc::clone(&self.layout);
        let url = url.clone();
        blocking(move || {
            let Some((path, before)) = layout.read_entity(&url)? else {
                return Ok(None);
            };
            let mut after = before.clone();
            update.apply(&mut after);
            write_doc(&path, &after)?;
            Ok(Some(before))
        })
        .await
    }

    async fn base_entity(&self, url: &Reference) -> Result<Option<BaseEntity>, BackendError> {
        let layout = Arc::clone(&self.layout);
        let url = url.clone();
        blocking(move || match layout.base_path(&url) {
            Some(path) => read_doc(&path),
            None => Ok(None),
        })
        .await
    }

    async fn base_entities_named(&self, name: &Name) -> Result<Vec<BaseEntity>, BackendError> {
        let layout = Arc::clone(&self.layout);
        let name = name.clone();
        blocking(move || layout.list_bases(Some(&name))).await
    }

    async fn all_base_entities(&self) -> Result<Vec<BaseEntity>, BackendError> {
        let layout = Arc::clone(&self.layout);
        blocking(move || layout.list_bases(None)).await
    }

    async fn insert_base_entity(&self, base: BaseEntity) -> Result<bool, BackendError> {
        let _guard = self.bases.lock().await;
        let layout = Arc::clone(&self.layout);
        blocking(move || {
            let path = layout
                .base_path(&base.url)
                .ok_or_else(|| BackendError::Corrupt(base.url.to_string()))?;
            if path.exists() {
                return Ok(false);
            }
            write_doc(&path, &base)?;
            Ok(true)
        })
        .await
    }

    async fn update_base_entity(
        &self,
        url: &Reference,
        update: BaseEntityUpdate,
    ) -> Result<Option<BaseEntity>, BackendError> {
        let _guard = self.bases.lock().await;
        let layout = Arc::clone(&self.layout);
        let url = url.clone();
        blocking(move || {
            let Some(path) = layout.base_path(&url) else {
                return Ok(None);
            };
            let Some(before) = read_doc::<BaseEntity>(&path)? else {
                return Ok(None);
            };
            let mut after = before.clone();
            update.apply(&mut after);
            write_doc(&path, &after)?;
            Ok(Some(before))
        })
        .await
    }

    async fn reserve_promulgated_revisions(
        &self,
        name: &Name,
        count: u32,
    ) -> Result<u32, BackendError> {
        let _guard = self.counters.lock().await;
        let layout = Arc::clone(&self.layout);
        let name = name.clone();
        blocking(move || {
            let path = layout.counter_path(&name);
            let mut counter = read_doc::<Counter>(&path)?.unwrap_or_default();
            let first = counter.next;
            counter.next = first
                .checked_add(count)
                .ok_or_else(|| BackendError::Exhausted(name.clone()))?;
            write_doc(&path, &counter)?;
            Ok(first)
        })
        .await
    }

    async fn executed_migrations(&self) -> Result<BTreeSet<String>, BackendError> {
        let layout = Arc::clone(&self.layout);
        blocking(move || Ok(read_doc(&layout.root.join(MIGRATIONS))?.unwrap_or_default())).await
    }
}

//================================================================================================
// Functions
//================================================================================================

async fn blocking<T, F>(f: F) -> Result<T, BackendError>
where
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, BackendError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_doc<T: Serialize>(path: &Path, doc: &T) -> Result<(), BackendError> {
    let dir = path
        .parent()
        .ok_or_else(|| BackendError::Corrupt(path.display().to_string()))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, doc)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

fn dirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

fn json_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == JSON) {
            files.push(path);
        }
    }
    Ok(files)
}
