//! Object storage backends
//!
//! Every backend implements [`StorageBackend`]: put one local file as one
//! object, applying the run's [`EncryptionConfig`]. Backends hold only static
//! configuration and an SDK client, so a single instance is shared by the
//! whole pipeline. None of them retry; a failed put is reported to the caller.

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::UploadError;

pub mod config;
pub mod encryption;
pub mod gcs;
pub mod minio;
pub mod s3;

pub use config::{BackendKind, StorageConfig};
pub use encryption::{CustomerKey, EncryptionConfig};
pub use gcs::GcsBackend;
pub use minio::MinioBackend;
pub use s3::SseCustomerBackend;

/// Uniform "put a local file as an object" capability
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Upload `source` to `bucket/key`.
    ///
    /// `size_hint` is the file length when known; some backends require it.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        source: tokio::fs::File,
        size_hint: Option<u64>,
        encryption: &EncryptionConfig,
    ) -> std::result::Result<(), UploadError>;
}

/// Build the backend selected by configuration
pub async fn build_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.backend {
        BackendKind::S3 => Arc::new(SseCustomerBackend::new(s3_client(config).await)),
        BackendKind::Minio => Arc::new(MinioBackend::new(s3_client(config).await)),
        BackendKind::Gcs => Arc::new(GcsBackend::new(config.gcs_service_account_path.clone())),
    };

    info!(backend = backend.name(), "Storage backend initialized");

    Ok(backend)
}

/// S3 client shared by the S3-compatible backends.
///
/// Static credentials are used when configured; otherwise the default AWS
/// provider chain supplies them.
pub async fn s3_client(config: &StorageConfig) -> aws_sdk_s3::Client {
    debug!(
        endpoint = ?config.endpoint,
        region = %config.region,
        path_style = config.path_style,
        "Initializing S3 client"
    );

    let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(config.path_style || config.backend == BackendKind::Minio);

    if let (Some(access_key), Some(secret)) = (&config.access_key, &config.secret_key) {
        builder = builder.credentials_provider(Credentials::new(
            access_key,
            secret.expose(),
            None,
            None,
            "dsync-storage",
        ));
    }

    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint);
    }

    aws_sdk_s3::Client::from_conf(builder.build())
}

/// Flatten an SDK error including its source chain
pub(crate) fn transport_error<E>(err: E) -> UploadError
where
    E: std::error::Error + 'static,
{
    UploadError::Transport(aws_sdk_s3::error::DisplayErrorContext(err).to_string())
}
