//! Google Cloud Storage backend
//!
//! Objects are written through a streaming writer. The writer only commits
//! the object on `shutdown`; a copy that is never flushed leaves nothing
//! behind, so failed copies abort the pending upload explicitly.

use async_trait::async_trait;
use object_store::{buffered::BufWriter, gcp::GoogleCloudStorageBuilder, path::Path, ObjectStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use super::encryption::EncryptionConfig;
use super::StorageBackend;
use crate::error::UploadError;

/// Store clients are built on first use of a bucket and reused afterwards
#[derive(Debug, Default)]
pub struct GcsBackend {
    service_account_path: Option<PathBuf>,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl GcsBackend {
    /// Without a service account file, credentials come from the
    /// `GOOGLE_*` environment the way `object_store` resolves them.
    pub fn new(service_account_path: Option<PathBuf>) -> Self {
        Self {
            service_account_path,
            stores: Mutex::default(),
        }
    }

    /// Backend writing `bucket` through an already configured store
    pub fn with_store(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        let backend = Self::default();
        backend.cache().insert(bucket.into(), store);
        backend
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn ObjectStore>>> {
        self.stores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, UploadError> {
        let mut stores = self.cache();
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);

        if let Some(path) = &self.service_account_path {
            builder = builder.with_service_account_path(path.to_string_lossy());
        }

        let store: Arc<dyn ObjectStore> = Arc::new(
            builder
                .build()
                .map_err(|e| UploadError::Transport(e.to_string()))?,
        );

        debug!(bucket, "Initialized gcs client");
        stores.insert(bucket.to_string(), Arc::clone(&store));

        Ok(store)
    }
}

#[async_trait]
impl StorageBackend for GcsBackend {
    fn name(&self) -> &'static str {
        "gcs"
    }

    #[instrument(skip(self, source, encryption), fields(backend = self.name()))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut source: tokio::fs::File,
        size_hint: Option<u64>,
        encryption: &EncryptionConfig,
    ) -> Result<(), UploadError> {
        if let EncryptionConfig::CustomerKey(_) = encryption {
            return Err(UploadError::Encryption(
                "customer-supplied keys are not supported by the gcs backend".to_string(),
            ));
        }

        debug!("Streaming to gs://{}/{} (size hint: {:?})", bucket, key, size_hint);

        let store = self.store_for(bucket)?;
        let mut writer = BufWriter::new(store, Path::from(key));

        if let Err(e) = tokio::io::copy(&mut source, &mut writer).await {
            if let Err(abort_err) = writer.abort().await {
                warn!(error = %abort_err, "Failed to abort pending gcs upload");
            }
            return Err(UploadError::Io(e));
        }

        writer
            .shutdown()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn test_customer_key_is_rejected_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g01.schema.gz");
        tokio::fs::write(&path, b"schema").await.unwrap();
        let file = tokio::fs::File::open(&path).await.unwrap();
        let key = super::super::CustomerKey::new(vec![7u8; 32]).unwrap();

        let result = GcsBackend::default()
            .put(
                "backups",
                "transformer.schema.gz",
                file,
                Some(6),
                &EncryptionConfig::CustomerKey(key),
            )
            .await;

        assert!(matches!(result, Err(UploadError::Encryption(_))));
    }

    #[tokio::test]
    async fn test_put_commits_object() {
        let store = Arc::new(InMemory::new());
        let backend = GcsBackend::with_store("backups", store.clone());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g01.rdf.gz");
        tokio::fs::write(&path, b"<0x1> <name> \"alpha\" .").await.unwrap();
        let file = tokio::fs::File::open(&path).await.unwrap();

        backend
            .put("backups", "transformer.rdf.gz", file, None, &EncryptionConfig::None)
            .await
            .unwrap();

        let stored = store
            .get(&Path::from("transformer.rdf.gz"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&stored[..], b"<0x1> <name> \"alpha\" .");
    }

    #[test]
    fn test_store_is_reused_per_bucket() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let backend = GcsBackend::with_store("backups", store.clone());

        let first = backend.store_for("backups").unwrap();
        let second = backend.store_for("backups").unwrap();

        assert!(Arc::ptr_eq(&first, &store));
        assert!(Arc::ptr_eq(&first, &second));
    }
}
