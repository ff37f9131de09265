//! Minio-style backend relying on store-managed server-side encryption

use async_trait::async_trait;
use aws_sdk_s3::{types::ServerSideEncryption, Client};
use tracing::{debug, instrument};

use super::encryption::EncryptionConfig;
use super::s3::{content_length, file_body, with_customer_key};
use super::{transport_error, StorageBackend};
use crate::error::UploadError;

/// Puts objects with an encryption descriptor and an exact content length
#[derive(Clone)]
pub struct MinioBackend {
    client: Client,
}

impl MinioBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StorageBackend for MinioBackend {
    fn name(&self) -> &'static str {
        "minio"
    }

    #[instrument(skip(self, source, encryption), fields(backend = self.name()))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        source: tokio::fs::File,
        size_hint: Option<u64>,
        encryption: &EncryptionConfig,
    ) -> Result<(), UploadError> {
        let size = size_hint.ok_or(UploadError::MissingSize)?;
        let content_length = content_length(size)?;

        debug!(
            "Uploading {} bytes to s3://{}/{} (encryption: {})",
            size,
            bucket,
            key,
            encryption.mode()
        );

        let body = file_body(source).await?;

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_length(content_length);

        request = match encryption {
            EncryptionConfig::None => request,
            EncryptionConfig::Managed { kms_key_id: None } => {
                request.server_side_encryption(ServerSideEncryption::Aes256)
            },
            EncryptionConfig::Managed {
                kms_key_id: Some(kms_key_id),
            } => request
                .server_side_encryption(ServerSideEncryption::AwsKms)
                .ssekms_key_id(kms_key_id),
            EncryptionConfig::CustomerKey(customer_key) => with_customer_key(request, customer_key),
        };

        request.send().await.map_err(transport_error)?;

        Ok(())
    }
}
