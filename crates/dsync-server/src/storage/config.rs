use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::encryption::{CustomerKey, EncryptionConfig};
use crate::config::Secret;
use crate::error::UploadError;

/// Default region sent to S3-compatible stores that ignore it
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Which object store implementation receives the exported files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// S3-compatible store with customer-supplied encryption keys (SSE-C)
    #[default]
    S3,
    /// Minio or another S3-compatible store with store-managed encryption
    Minio,
    /// Google Cloud Storage
    Gcs,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::S3 => write!(f, "s3"),
            BackendKind::Minio => write!(f, "minio"),
            BackendKind::Gcs => write!(f, "gcs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<Secret>,
    pub path_style: bool,

    /// Service account JSON used by the GCS backend
    pub gcs_service_account_path: Option<PathBuf>,

    /// Raw customer key for SSE-C, exactly 32 bytes
    pub crypto_key: Option<Secret>,

    /// Ask the store to encrypt objects with its own keys
    pub managed_sse: bool,
    pub kms_key_id: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::S3,
            endpoint: None,
            region: DEFAULT_S3_REGION.to_string(),
            access_key: None,
            secret_key: None,
            path_style: false,
            gcs_service_account_path: None,
            crypto_key: None,
            managed_sse: false,
            kms_key_id: None,
        }
    }
}

impl StorageConfig {
    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Minio,
            endpoint: Some(endpoint.into()),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some(Secret::new("minioadmin")),
            path_style: true,
            ..Self::default()
        }
    }

    /// Encryption applied to every object written in this run
    pub fn encryption(&self) -> Result<EncryptionConfig, UploadError> {
        if let Some(key) = &self.crypto_key {
            return Ok(EncryptionConfig::CustomerKey(CustomerKey::new(
                key.expose().as_bytes(),
            )?));
        }

        if self.managed_sse || self.kms_key_id.is_some() {
            return Ok(EncryptionConfig::Managed {
                kms_key_id: self.kms_key_id.clone(),
            });
        }

        Ok(EncryptionConfig::None)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_key.is_some() != self.secret_key.is_some() {
            anyhow::bail!("Storage access key and secret must be provided together");
        }

        match self.backend {
            BackendKind::S3 => {
                if self.crypto_key.is_none() {
                    anyhow::bail!("The s3 backend requires a customer encryption key (--crypto-key)");
                }
            },
            BackendKind::Minio => {
                if self.endpoint.is_none() {
                    anyhow::bail!("The minio backend requires an endpoint");
                }
            },
            BackendKind::Gcs => {
                if self.crypto_key.is_some() {
                    anyhow::bail!("The gcs backend does not support customer encryption keys");
                }
            },
        }

        self.encryption()?;

        Ok(())
    }
}
