//! Error types for the sync pipeline
//!
//! Each stage has its own error so that the controller can log the failing
//! unit of work (one status poll, one file, one directory) with context.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while querying the admin endpoint for a task status
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("status request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("status request returned HTTP {0}")]
    Http(reqwest::StatusCode),

    #[error("malformed status response: {0}")]
    Decode(String),
}

/// Errors while waiting for an export task to finish
#[derive(Error, Debug)]
pub enum WaitError {
    #[error("export task {task_id} failed")]
    TaskFailed { task_id: String },

    #[error("status query for task {task_id} failed: {source}")]
    Status {
        task_id: String,
        #[source]
        source: StatusError,
    },

    #[error("export task {task_id} did not finish within {waited_secs}s")]
    TimedOut { task_id: String, waited_secs: u64 },
}

/// Reasons an admin response is not treated as an export trigger
#[derive(Error, Debug)]
pub enum TapError {
    /// Ordinary admin traffic without `data.export`
    #[error("not an export response")]
    NotExport,

    #[error("malformed export response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("export message carries no task id: {0:?}")]
    MissingTaskId(String),
}

/// Errors raised by a storage backend for a single object
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("storage transport error: {0}")]
    Transport(String),

    #[error("invalid encryption parameters: {0}")]
    Encryption(String),

    #[error("backend requires the object size but none was provided")]
    MissingSize,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while synchronizing one export directory
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("error reading dir {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error opening file {path} after {attempts} attempts: {source}")]
    Open {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("error storing {path} as {key}: {source}")]
    Upload {
        path: PathBuf,
        key: String,
        #[source]
        source: UploadError,
    },

    #[error("error cleaning dir {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for directory sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;
