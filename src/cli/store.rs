//! Opening the store the command line operates on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use charm::blob::DirBlobStore;
use charm::store::fs::FsBackend;
use charm::{SessionPool, Store};

const BLOB_DIR: &str = "blobs";
const DOC_DIR: &str = "docs";

//================================================================================================
// Types
//================================================================================================

/// An opened store and the blob store beside it.
pub(super) struct Opened {
    pub(super) store: Store,
    pub(super) blobs: DirBlobStore,
}

//================================================================================================
// Functions
//================================================================================================

/// Open the store rooted at `root`, or at the configured root if none is given.
pub(super) async fn open(root: Option<&Path>) -> anyhow::Result<Opened> {
    let config = &config::CONFIG.store;
    let root: PathBuf = root.map_or_else(|| config.root.clone(), Path::to_path_buf);

    let backend = FsBackend::open(root.join(DOC_DIR)).await?;
    let pool = SessionPool::from_config(config);
    tracing::debug!(
        root = %root.display(),
        max_sessions = pool.limit(),
        "opening charm store"
    );

    Ok(Opened {
        store: Store::open(Arc::new(backend), pool).await?,
        blobs: DirBlobStore::new(root.join(BLOB_DIR)),
    })
}
