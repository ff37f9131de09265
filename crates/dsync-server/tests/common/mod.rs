//! Shared fixtures for dsync integration tests
//!
//! - [`RecordingBackend`]: in-memory [`StorageBackend`] that records every put
//! - [`ScriptedStatus`]: [`TaskStatusSource`] replaying per-task status scripts
//! - [`write_batch`]: lays out one export batch directory on disk

#![allow(dead_code)]

use async_trait::async_trait;
use dsync_common::TaskStatus;
use dsync_server::error::{StatusError, UploadError};
use dsync_server::status::TaskStatusSource;
use dsync_server::storage::{EncryptionConfig, StorageBackend};
use dsync_server::syncer::{DirectorySyncer, ReadinessPolicy};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;

pub const TEST_BUCKET: &str = "dsync-test";
pub const SCHEMA_MARKER: &str = "gql_schema";

pub const RDF_BODY: &[u8] = b"<0x1> <name> \"alpha\" .\n";
pub const SCHEMA_BODY: &[u8] = b"name: string @index(exact) .\n";
pub const GQL_SCHEMA_BODY: &[u8] = b"type Person { name: String }\n";

/// One recorded put
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub size_hint: Option<u64>,
}

#[derive(Default)]
pub struct RecordingBackend {
    uploads: Mutex<Vec<Upload>>,
    fail_key: Mutex<Option<String>>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend rejecting every put to `key`
    pub fn failing_on(key: &str) -> Arc<Self> {
        let backend = Self::default();
        *backend.fail_key.lock().unwrap() = Some(key.to_string());
        Arc::new(backend)
    }

    pub fn clear_failure(&self) {
        *self.fail_key.lock().unwrap() = None;
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.uploads().into_iter().map(|u| u.key).collect()
    }
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut source: tokio::fs::File,
        size_hint: Option<u64>,
        _encryption: &EncryptionConfig,
    ) -> Result<(), UploadError> {
        if self.fail_key.lock().unwrap().as_deref() == Some(key) {
            return Err(UploadError::Transport(format!("injected failure for {key}")));
        }

        let mut body = Vec::new();
        source.read_to_end(&mut body).await?;

        self.uploads.lock().unwrap().push(Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
            size_hint,
        });

        Ok(())
    }
}

/// Status source answering from a script per task id.
///
/// Once a script is exhausted the task reports `Running` forever.
#[derive(Default)]
pub struct ScriptedStatus {
    scripts: Mutex<HashMap<String, VecDeque<TaskStatus>>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, task_id: &str, statuses: &[TaskStatus]) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .insert(task_id.to_string(), statuses.iter().copied().collect());
        Arc::clone(self)
    }

    /// Task ids in the order they were queried
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskStatusSource for ScriptedStatus {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, StatusError> {
        self.queries.lock().unwrap().push(task_id.to_string());

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(task_id)
            .and_then(VecDeque::pop_front);

        Ok(next.unwrap_or(TaskStatus::Running))
    }
}

/// Create `root/name` holding an rdf artifact, a schema artifact and the
/// schema marker, as the database lays out one export batch.
pub fn write_batch(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("g01.rdf.gz"), RDF_BODY).unwrap();
    std::fs::write(dir.join("g01.schema.gz"), SCHEMA_BODY).unwrap();
    std::fs::write(dir.join("g01.gql_schema.gz"), GQL_SCHEMA_BODY).unwrap();
    dir
}

pub fn syncer(backend: Arc<RecordingBackend>, readiness: ReadinessPolicy) -> DirectorySyncer {
    DirectorySyncer::new(
        backend,
        TEST_BUCKET,
        EncryptionConfig::None,
        SCHEMA_MARKER,
        readiness,
    )
}

/// Single attempt, no waiting
pub fn impatient() -> ReadinessPolicy {
    ReadinessPolicy {
        attempts: 1,
        interval: Duration::ZERO,
    }
}

/// Hold an exclusive lock on `path` until the returned handle is dropped
pub fn hold_lock(path: &Path) -> std::fs::File {
    let file = std::fs::File::open(path).unwrap();
    file.lock().unwrap();
    file
}
