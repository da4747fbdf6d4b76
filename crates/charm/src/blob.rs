//! # Blob Store Collaborator
//!
//! Artifact bytes never pass through the engine; it records only the handle,
//! hash and size a blob store returns. [`BlobStore`] is that collaborator's
//! interface, and [`DirBlobStore`] a content-addressed directory implementation
//! used by the command line.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::entity::BlobInfo;
use crate::store::BackendError;

/// A readable blob stream.
pub type BlobStream = Pin<Box<dyn AsyncRead + Send>>;

/// A key → stream content service.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes`, returning their descriptors.
    async fn put(&self, bytes: &[u8]) -> Result<BlobInfo, BackendError>;
    /// Open a previously stored blob.
    async fn open(&self, handle: &str) -> Result<BlobStream, BackendError>;
}

/// Blobs stored as files named by their BLAKE3 hash.
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    /// A blob store writing beneath `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirBlobStore { root: root.into() }
    }
}

/// The content hash of `bytes`, base32 encoded.
pub fn hash(bytes: &[u8]) -> String {
    base32::encode(crate::BASE32, blake3::hash(bytes).as_bytes())
}

#[async_trait]
impl BlobStore for DirBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<BlobInfo, BackendError> {
        let hash = hash(bytes);
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(&hash);
        if !tokio::fs::try_exists(&path).await? {
            let tmp = self.root.join(format!(".{hash}.tmp"));
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &path).await?;
        }
        tracing::debug!(%hash, size = bytes.len(), "stored blob");
        Ok(BlobInfo {
            handle: hash.clone(),
            hash,
            size: bytes.len() as u64,
        })
    }

    async fn open(&self, handle: &str) -> Result<BlobStream, BackendError> {
        let file = tokio::fs::File::open(self.root.join(handle)).await?;
        Ok(Box::pin(file))
    }
}
