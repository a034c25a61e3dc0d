//! Content Store
//!
//! Content-addressed blob storage on the local filesystem.
//! Layout: `{root}/{key[0:2]}/{key}`, raw bytes, no sidecar metadata.
//! A file at a blob's placement path is the only record that the blob exists.
//!
//! The store holds no locks. Concurrent callers are kept consistent by the
//! filesystem: shard directories are created idempotently, blobs are
//! published from a fully written temp file in the same shard, and every
//! "file vanished underneath us" case maps to `NotFound`.

use std::ffi::OsStr;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::key::{BlobKey, HashAlgorithm, KeyError};
use super::types::{Blob, PutOutcome, StoreError};
use crate::config::StorageConfig;

/// How many times a put recreates a shard directory reclaimed under it
const PUBLISH_ATTEMPTS: usize = 3;

const TEMP_SUFFIX: &str = ".tmp";

// ============================================================================
// Content Store
// ============================================================================

/// Sharded content-addressed store
#[derive(Clone)]
pub struct ContentStore {
    inner: Arc<ContentStoreInner>,
}

struct ContentStoreInner {
    root: PathBuf,
    algorithm: HashAlgorithm,
    verify_duplicates: bool,
}

impl ContentStore {
    /// Open the store, creating its root directory if missing
    pub async fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.root)
            .await
            .map_err(|e| StoreError::io("create store root", &config.root, e))?;

        tracing::debug!(
            root = %config.root.display(),
            algorithm = %config.hash_algorithm,
            verify_duplicates = config.verify_duplicates,
            "Content store opened"
        );

        Ok(Self {
            inner: Arc::new(ContentStoreInner {
                root: config.root.clone(),
                algorithm: config.hash_algorithm,
                verify_duplicates: config.verify_duplicates,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.inner.algorithm
    }

    /// Key for a byte sequence under this store's digest
    pub fn key_for(&self, data: &[u8]) -> BlobKey {
        self.inner.algorithm.key_for(data)
    }

    /// Sanitize a caller-supplied key
    pub fn parse_key(&self, raw: &str) -> Result<BlobKey, KeyError> {
        BlobKey::parse(raw, self.inner.algorithm)
    }

    pub fn shard_dir(&self, key: &BlobKey) -> PathBuf {
        self.inner.root.join(key.shard())
    }

    /// Placement path of a blob
    pub fn blob_path(&self, key: &BlobKey) -> PathBuf {
        self.shard_dir(key).join(key.as_str())
    }

    /// Store bytes under their content key
    ///
    /// Re-putting content that is already present is a successful no-op that
    /// reports `created: false`. Callers must not pass an empty slice.
    pub async fn put(&self, data: &[u8]) -> Result<PutOutcome, StoreError> {
        let key = self.key_for(data);
        let path = self.blob_path(&key);

        if self.existing_matches(&key, &path, data).await? {
            tracing::debug!(key = %key, "Blob already exists, skipping write");
            return Ok(PutOutcome {
                key,
                created: false,
            });
        }

        let shard_dir = self.shard_dir(&key);
        let created = self.publish(&key, &shard_dir, &path, data).await?;

        if created {
            tracing::info!(key = %key, size = data.len(), "Blob stored");
        } else {
            tracing::debug!(key = %key, "Concurrent upload published first");
        }

        Ok(PutOutcome { key, created })
    }

    /// Open a blob for streaming
    pub async fn get(&self, key: &BlobKey) -> Result<Blob, StoreError> {
        let path = self.blob_path(key);

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.clone()))
            }
            Err(e) => return Err(StoreError::io("open", &path, e)),
        };

        let size = file
            .metadata()
            .await
            .map_err(|e| StoreError::io("stat", &path, e))?
            .len();

        Ok(Blob {
            key: key.clone(),
            size,
            file,
        })
    }

    /// Remove a blob, then try to reclaim its shard directory
    pub async fn delete(&self, key: &BlobKey) -> Result<(), StoreError> {
        let path = self.blob_path(key);

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.clone()))
            }
            Err(e) => return Err(StoreError::io("remove", &path, e)),
        }

        tracing::info!(key = %key, "Blob deleted");

        self.reclaim_shard(&self.shard_dir(key)).await;
        Ok(())
    }

    pub async fn contains(&self, key: &BlobKey) -> Result<bool, StoreError> {
        let path = self.blob_path(key);
        fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io("check", &path, e))
    }

    /// Remove temp files orphaned by writers that died mid-publish
    ///
    /// Must run before the store starts accepting writes, since it cannot
    /// tell an orphan from a temp file that is still being written.
    pub async fn cleanup_temp_files(&self) -> Result<usize, StoreError> {
        let root = &self.inner.root;
        let mut cleaned = 0;

        let mut shards = fs::read_dir(root)
            .await
            .map_err(|e| StoreError::io("list", root, e))?;

        while let Some(shard) = shards
            .next_entry()
            .await
            .map_err(|e| StoreError::io("list", root, e))?
        {
            let shard_path = shard.path();
            let is_dir = shard.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }

            let removed_here = sweep_shard(&shard_path).await?;
            if removed_here > 0 {
                self.reclaim_shard(&shard_path).await;
                cleaned += removed_here;
            }
        }

        if cleaned > 0 {
            tracing::info!(count = cleaned, "Cleaned up orphaned temp files");
        }

        Ok(cleaned)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Whether a blob for this key is already stored
    ///
    /// With duplicate verification on, the stored bytes must equal the upload.
    async fn existing_matches(
        &self,
        key: &BlobKey,
        path: &Path,
        data: &[u8],
    ) -> Result<bool, StoreError> {
        if !self.inner.verify_duplicates {
            return fs::try_exists(path)
                .await
                .map_err(|e| StoreError::io("check", path, e));
        }

        match fs::read(path).await {
            Ok(stored) if stored == data => Ok(true),
            Ok(stored) => {
                tracing::error!(
                    key = %key,
                    stored_size = stored.len(),
                    upload_size = data.len(),
                    "Digest collision: stored content differs from upload"
                );
                Err(StoreError::Collision(key.clone()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io("read", path, e)),
        }
    }

    /// Write to a temp file in the shard, then publish it at `path`
    ///
    /// Returns false if another writer published the same key first.
    async fn publish(
        &self,
        key: &BlobKey,
        shard_dir: &Path,
        path: &Path,
        data: &[u8],
    ) -> Result<bool, StoreError> {
        let mut attempt = 1;

        let temp_path = loop {
            fs::create_dir_all(shard_dir)
                .await
                .map_err(|e| StoreError::io("create shard directory", shard_dir, e))?;

            match write_temp(shard_dir, key, data).await {
                Ok(temp_path) => break temp_path,
                // A concurrent delete reclaimed the shard between mkdir and create
                Err(e) if e.kind() == ErrorKind::NotFound && attempt < PUBLISH_ATTEMPTS => {
                    tracing::debug!(key = %key, attempt, "Shard directory vanished, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(StoreError::io("write temp file in", shard_dir, e)),
            }
        };

        let published = link_into_place(&temp_path, path).await;
        discard_temp(&temp_path).await;

        published.map_err(|e| StoreError::io("publish", path, e))
    }

    /// Best-effort removal of a shard directory that may now be empty
    ///
    /// Failure (not empty, or racing a put into the same shard) only leaves
    /// an empty directory behind, so it is logged and never propagated.
    async fn reclaim_shard(&self, shard_dir: &Path) {
        match fs::remove_dir(shard_dir).await {
            Ok(()) => {
                tracing::debug!(shard = %shard_dir.display(), "Reclaimed empty shard directory")
            }
            Err(e) => {
                tracing::trace!(shard = %shard_dir.display(), error = %e, "Shard directory kept")
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Remove temp files from one shard directory
///
/// A shard reclaimed by a concurrent delete has nothing left to sweep.
async fn sweep_shard(shard_path: &Path) -> Result<usize, StoreError> {
    let mut entries = match fs::read_dir(shard_path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StoreError::io("list", shard_path, e)),
    };

    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::io("list", shard_path, e))?
    {
        if !is_temp_name(&entry.file_name()) {
            continue;
        }

        let temp_path = entry.path();
        match fs::remove_file(&temp_path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io("remove", &temp_path, e)),
        }
    }

    Ok(removed)
}

fn is_temp_name(name: &OsStr) -> bool {
    name.to_str()
        .map(|n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX))
        .unwrap_or(false)
}

/// Create a uniquely named temp file next to the final path and fill it
async fn write_temp(shard_dir: &Path, key: &BlobKey, data: &[u8]) -> io::Result<PathBuf> {
    let temp_path = shard_dir.join(format!(".{}.{}{}", key, Uuid::new_v4().simple(), TEMP_SUFFIX));

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await?;

    let written: io::Result<()> = async {
        file.write_all(data).await?;
        file.sync_all().await
    }
    .await;
    drop(file);

    if let Err(e) = written {
        discard_temp(&temp_path).await;
        return Err(e);
    }

    Ok(temp_path)
}

/// Publish a complete temp file at its final path without clobbering
///
/// A hard link either appears whole or fails with `AlreadyExists`, in which
/// case the existing blob has identical content by construction. Filesystems
/// without hard links fall back to an atomic rename.
async fn link_into_place(temp_path: &Path, path: &Path) -> io::Result<bool> {
    match fs::hard_link(temp_path, path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) if matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::PermissionDenied) => {
            tracing::debug!(error = %e, "Hard links unavailable, publishing by rename");
            fs::rename(temp_path, path).await.map(|()| true)
        }
        Err(e) => Err(e),
    }
}

async fn discard_temp(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove temp file");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
