//! Upload of one completed export directory
//!
//! Every artifact in the directory is uploaded under its derived object key.
//! The directory is removed only after all uploads succeeded; removal is the
//! signal that the batch is backed up. On any failure the directory stays in
//! place so the next trigger picks it up again.

use dsync_common::types::object_key_for;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use crate::error::{SyncError, SyncResult, UploadError};
use crate::storage::{EncryptionConfig, StorageBackend};

/// How long to wait for the database to finish writing a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: crate::config::DEFAULT_OPEN_ATTEMPTS,
            interval: Duration::from_secs(crate::config::DEFAULT_OPEN_RETRY_INTERVAL_SECS),
        }
    }
}

/// One uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedObject {
    pub path: PathBuf,
    pub key: &'static str,
    pub size: u64,
}

/// Outcome of a successful directory sync
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub dir: PathBuf,
    pub objects: Vec<SyncedObject>,
}

pub struct DirectorySyncer {
    backend: Arc<dyn StorageBackend>,
    bucket: String,
    encryption: EncryptionConfig,
    schema_marker: String,
    readiness: ReadinessPolicy,
}

impl DirectorySyncer {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        bucket: impl Into<String>,
        encryption: EncryptionConfig,
        schema_marker: impl Into<String>,
        readiness: ReadinessPolicy,
    ) -> Self {
        Self {
            backend,
            bucket: bucket.into(),
            encryption,
            schema_marker: schema_marker.into(),
            readiness,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload every artifact in `dir`, then remove the directory.
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn sync_dir(&self, dir: &Path) -> SyncResult<SyncReport> {
        let files = self.artifacts(dir).await?;
        let mut objects = Vec::with_capacity(files.len());

        for path in files {
            objects.push(self.sync_file(&path).await?);
        }

        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|source| SyncError::Cleanup {
                path: dir.to_path_buf(),
                source,
            })?;

        info!(objects = objects.len(), "Export directory synchronized and removed");

        Ok(SyncReport {
            dir: dir.to_path_buf(),
            objects,
        })
    }

    /// Regular files of `dir` without the schema marker, sorted by name
    async fn artifacts(&self, dir: &Path) -> SyncResult<Vec<PathBuf>> {
        let read_dir_err = |source| SyncError::ReadDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(read_dir_err)?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
            let name = entry.file_name();
            if name.to_string_lossy().contains(&self.schema_marker) {
                debug!(file = ?name, "Skipping schema marker");
                continue;
            }

            let file_type = entry.file_type().await.map_err(read_dir_err)?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    async fn sync_file(&self, path: &Path) -> SyncResult<SyncedObject> {
        let file = self.open_when_ready(path).await?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = object_key_for(&name);

        let size = file
            .metadata()
            .await
            .map_err(|e| upload_failed(path, key, e.into()))?
            .len();

        info!(
            path = %path.display(),
            bucket = %self.bucket,
            key,
            size,
            "Initiating sync"
        );

        self.backend
            .put(&self.bucket, key, file, Some(size), &self.encryption)
            .await
            .map_err(|source| upload_failed(path, key, source))?;

        info!(
            path = %path.display(),
            bucket = %self.bucket,
            key,
            "synchronized"
        );

        Ok(SyncedObject {
            path: path.to_path_buf(),
            key,
            size,
        })
    }

    /// Retry exclusive opens until one succeeds or the policy is exhausted
    async fn open_when_ready(&self, path: &Path) -> SyncResult<tokio::fs::File> {
        let attempts = self.readiness.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match open_exclusive(path).await {
                Ok(file) => return Ok(file),
                Err(source) if attempt >= attempts => {
                    return Err(SyncError::Open {
                        path: path.to_path_buf(),
                        attempts,
                        source,
                    })
                },
                Err(e) => {
                    info!(
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "File not ready for exclusive read, retrying"
                    );
                    sleep(self.readiness.interval).await;
                },
            }
        }
    }
}

fn upload_failed(path: &Path, key: &str, source: UploadError) -> SyncError {
    SyncError::Upload {
        path: path.to_path_buf(),
        key: key.to_string(),
        source,
    }
}

/// Open `path` read-only holding a non-blocking exclusive lock.
///
/// The lock is released when the returned file is dropped.
pub async fn open_exclusive(path: &Path) -> io::Result<tokio::fs::File> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> io::Result<tokio::fs::File> {
        let file = std::fs::File::open(&path)?;
        file.try_lock()?;
        Ok(tokio::fs::File::from_std(file))
    })
    .await
    .map_err(io::Error::other)?
}
