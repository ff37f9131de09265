//! Error types shared across dsync crates

use thiserror::Error;

/// Result type alias for common dsync operations
pub type Result<T> = std::result::Result<T, DsyncError>;

/// Common error type
#[derive(Error, Debug)]
pub enum DsyncError {
    #[error("Parse error: {0}")]
    Parse(String),
}
