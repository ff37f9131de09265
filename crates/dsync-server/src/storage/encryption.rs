//! Encryption settings applied to uploaded objects

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::UploadError;

/// Algorithm marker required by the SSE-C protocol
pub const SSE_CUSTOMER_ALGORITHM: &str = "AES256";

/// Length in bytes of an AES-256 customer key
pub const CUSTOMER_KEY_LEN: usize = 32;

/// Raw customer-supplied key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct CustomerKey {
    raw: Vec<u8>,
}

impl CustomerKey {
    pub fn new(raw: impl Into<Vec<u8>>) -> Result<Self, UploadError> {
        let raw = raw.into();
        if raw.len() != CUSTOMER_KEY_LEN {
            return Err(UploadError::Encryption(format!(
                "customer key must be {} bytes, got {}",
                CUSTOMER_KEY_LEN,
                raw.len()
            )));
        }
        Ok(Self { raw })
    }

    /// Base64 of the raw key, as sent in the SSE-C key header
    pub fn encoded_key(&self) -> String {
        STANDARD.encode(&self.raw)
    }

    /// Base64 MD5 of the raw key, the integrity check for the key header
    pub fn key_md5(&self) -> String {
        STANDARD.encode(md5::compute(&self.raw).0)
    }
}

impl std::fmt::Debug for CustomerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CustomerKey(***)")
    }
}

/// Encryption applied uniformly to every object a backend writes in one run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EncryptionConfig {
    #[default]
    None,
    /// Caller-supplied key sent with every request (SSE-C)
    CustomerKey(CustomerKey),
    /// Store-managed keys, optionally a specific KMS key
    Managed { kms_key_id: Option<String> },
}

impl EncryptionConfig {
    /// Short label safe for logs
    pub fn mode(&self) -> &'static str {
        match self {
            EncryptionConfig::None => "none",
            EncryptionConfig::CustomerKey(_) => "sse-c",
            EncryptionConfig::Managed { kms_key_id: None } => "sse",
            EncryptionConfig::Managed { kms_key_id: Some(_) } => "sse-kms",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_key_length() {
        assert!(CustomerKey::new(vec![0u8; 32]).is_ok());
        assert!(matches!(
            CustomerKey::new(vec![0u8; 16]),
            Err(UploadError::Encryption(_))
        ));
    }

    #[test]
    fn test_customer_key_digest() {
        let key = CustomerKey::new(vec![0u8; 32]).unwrap();
        assert_eq!(key.encoded_key(), "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
        // md5 of 32 zero bytes
        assert_eq!(key.key_md5(), "cLyPS3KoaSFGi/joRB3OUQ==");
    }

    #[test]
    fn test_customer_key_debug_is_redacted() {
        let key = CustomerKey::new(*b"0123456789abcdef0123456789abcdef").unwrap();
        let rendered = format!("{:?}", EncryptionConfig::CustomerKey(key));
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(EncryptionConfig::None.mode(), "none");
        assert_eq!(
            EncryptionConfig::Managed { kms_key_id: Some("k".into()) }.mode(),
            "sse-kms"
        );
    }
}
