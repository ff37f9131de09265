//! S3-compatible backend with customer-supplied encryption keys (SSE-C)

use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client};
use tracing::{debug, instrument};

use super::encryption::{CustomerKey, EncryptionConfig, SSE_CUSTOMER_ALGORITHM};
use super::{transport_error, StorageBackend};
use crate::error::UploadError;

/// Sends the raw key, its MD5 digest and the AES256 marker with every object
#[derive(Clone)]
pub struct SseCustomerBackend {
    client: Client,
}

impl SseCustomerBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StorageBackend for SseCustomerBackend {
    fn name(&self) -> &'static str {
        "s3-sse-c"
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
        let EncryptionConfig::CustomerKey(customer_key) = encryption else {
            return Err(UploadError::Encryption(format!(
                "backend {} needs a customer key, got {}",
                self.name(),
                encryption.mode()
            )));
        };

        debug!("Uploading to s3://{}/{} (size hint: {:?})", bucket, key, size_hint);

        let body = file_body(source).await?;

        let mut request = self.client.put_object().bucket(bucket).key(key).body(body);
        request = with_customer_key(request, customer_key);

        if let Some(size) = size_hint {
            request = request.content_length(content_length(size)?);
        }

        request.send().await.map_err(transport_error)?;

        Ok(())
    }
}

/// Attach the SSE-C headers for `key` to a put request
pub(crate) fn with_customer_key(
    request: aws_sdk_s3::operation::put_object::builders::PutObjectFluentBuilder,
    key: &CustomerKey,
) -> aws_sdk_s3::operation::put_object::builders::PutObjectFluentBuilder {
    request
        .sse_customer_algorithm(SSE_CUSTOMER_ALGORITHM)
        .sse_customer_key(key.encoded_key())
        .sse_customer_key_md5(key.key_md5())
}

/// Object size as the SDK's signed content length
pub(crate) fn content_length(size: u64) -> Result<i64, UploadError> {
    i64::try_from(size)
        .map_err(|_| UploadError::Transport(format!("object too large: {size} bytes")))
}

/// Streaming request body backed by an already opened file
pub(crate) async fn file_body(source: tokio::fs::File) -> Result<ByteStream, UploadError> {
    ByteStream::read_from()
        .file(source)
        .build()
        .await
        .map_err(|e| UploadError::Io(std::io::Error::other(e)))
}
