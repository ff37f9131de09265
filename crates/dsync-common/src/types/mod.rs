//! Domain types shared by the proxy tap and the sync pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DsyncError;

// ============================================================================
// Export Events
// ============================================================================

/// Signals that an export was triggered on the database.
///
/// `task_id` is only present when the trigger returned an asynchronous task
/// handle. The synchronous export endpoint produces events without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEvent {
    /// Identifier used to correlate log lines for one trigger
    pub id: Uuid,
    pub task_id: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl ExportEvent {
    /// Event for an export that is tracked by an asynchronous task
    pub fn with_task(task_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: Some(task_id.into()),
            observed_at: Utc::now(),
        }
    }

    /// Event for an export that completed synchronously
    pub fn completed() -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: None,
            observed_at: Utc::now(),
        }
    }
}

// ============================================================================
// Task Status
// ============================================================================

/// Status of an asynchronous export task as reported by the admin endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    Running,
    Success,
    Failed,
    Unknown,
}

impl TaskStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::Running => "Running",
            TaskStatus::Success => "Success",
            TaskStatus::Failed => "Failed",
            TaskStatus::Unknown => "Unknown",
        }
    }

    /// `Success` and `Failed` end polling; everything else keeps waiting.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    /// Lenient decoding used for remote payloads: unrecognized values are
    /// treated as `Unknown` so that polling continues.
    pub fn from_wire(value: &str) -> Self {
        value.parse().unwrap_or(TaskStatus::Unknown)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = DsyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(TaskStatus::Queued),
            "Running" => Ok(TaskStatus::Running),
            "Success" => Ok(TaskStatus::Success),
            "Failed" => Ok(TaskStatus::Failed),
            "Unknown" => Ok(TaskStatus::Unknown),
            other => Err(DsyncError::Parse(format!("invalid task status: {other}"))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Object Naming
// ============================================================================

/// Object key for RDF exports
pub const RDF_OBJECT_KEY: &str = "transformer.rdf.gz";

/// Object key for schema exports
pub const SCHEMA_OBJECT_KEY: &str = "transformer.schema.gz";

/// Object key for anything that is neither RDF nor schema
pub const UNKNOWN_OBJECT_KEY: &str = "unknown-object";

/// Maps an exported file name to the remote object key.
///
/// The rdf match wins over the schema match. Re-uploading the same file
/// always targets the same key, so retries overwrite instead of duplicating.
pub fn object_key_for(file_name: &str) -> &'static str {
    if file_name.contains("rdf") {
        RDF_OBJECT_KEY
    } else if file_name.contains("schema") {
        SCHEMA_OBJECT_KEY
    } else {
        UNKNOWN_OBJECT_KEY
    }
}
