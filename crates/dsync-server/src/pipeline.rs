//! Single consumer of export events
//!
//! Events are handled strictly one at a time in arrival order: wait for the
//! export task if the event names one, then sync every batch directory under
//! the watch root. No error ends the loop; only a closed channel does.

use dsync_common::ExportEvent;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::WaitError;
use crate::syncer::DirectorySyncer;
use crate::waiter::CompletionWaiter;

/// How one event pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The export task did not complete; nothing was scanned
    WaitFailed,
    /// The watch root could not be listed
    ListingFailed,
    /// Every listed directory was attempted
    Completed {
        synced: Vec<PathBuf>,
        failed: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub event: ExportEvent,
    pub outcome: PassOutcome,
}

impl PassReport {
    pub fn synced(&self) -> &[PathBuf] {
        match &self.outcome {
            PassOutcome::Completed { synced, .. } => synced,
            _ => &[],
        }
    }

    pub fn failed(&self) -> &[PathBuf] {
        match &self.outcome {
            PassOutcome::Completed { failed, .. } => failed,
            _ => &[],
        }
    }
}

pub struct PipelineController {
    waiter: CompletionWaiter,
    syncer: DirectorySyncer,
    watch_dir: PathBuf,
    completion_timeout: Option<Duration>,
}

impl PipelineController {
    pub fn new(waiter: CompletionWaiter, syncer: DirectorySyncer, watch_dir: PathBuf) -> Self {
        Self {
            waiter,
            syncer,
            watch_dir,
            completion_timeout: None,
        }
    }

    /// Bound each completion wait; unbounded by default
    pub fn with_completion_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Run the controller on its own task
    pub fn spawn(self, events: mpsc::Receiver<ExportEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    /// Handle events until every sender is dropped
    pub async fn run(self, mut events: mpsc::Receiver<ExportEvent>) {
        info!(
            watch_dir = %self.watch_dir.display(),
            bucket = self.syncer.bucket(),
            "Pipeline controller started"
        );

        while let Some(event) = events.recv().await {
            self.handle_event(&event).await;
        }

        info!("Event channel closed, pipeline controller stopped");
    }

    /// Process one event to completion
    pub async fn handle_event(&self, event: &ExportEvent) -> PassReport {
        let span = info_span!(
            "export_pass",
            event_id = %event.id,
            task_id = event.task_id.as_deref().unwrap_or("-")
        );

        let outcome = self.pass(event).instrument(span).await;

        PassReport {
            event: event.clone(),
            outcome,
        }
    }

    async fn pass(&self, event: &ExportEvent) -> PassOutcome {
        if let Some(task_id) = &event.task_id {
            if let Err(e) = self.wait_for(task_id).await {
                error!(task_id = %task_id, error = %e, "Export did not complete, skipping sync");
                return PassOutcome::WaitFailed;
            }
        }

        let dirs = match list_batches(&self.watch_dir).await {
            Ok(dirs) => dirs,
            Err(e) => {
                error!(
                    dir = %self.watch_dir.display(),
                    error = %e,
                    "Error while listing watch directory"
                );
                return PassOutcome::ListingFailed;
            },
        };

        if dirs.is_empty() {
            info!(dir = %self.watch_dir.display(), "No export directories to sync");
        }

        let mut synced = Vec::new();
        let mut failed = Vec::new();

        for dir in dirs {
            match self.syncer.sync_dir(&dir).await {
                Ok(report) => {
                    info!(
                        dir = %dir.display(),
                        objects = report.objects.len(),
                        "Export directory backed up"
                    );
                    synced.push(dir);
                },
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Export directory left for next trigger");
                    failed.push(dir);
                },
            }
        }

        PassOutcome::Completed { synced, failed }
    }

    async fn wait_for(&self, task_id: &str) -> Result<(), WaitError> {
        match self.completion_timeout {
            None => self.waiter.wait(task_id).await,
            Some(limit) => tokio::time::timeout(limit, self.waiter.wait(task_id))
                .await
                .map_err(|_| WaitError::TimedOut {
                    task_id: task_id.to_string(),
                    waited_secs: limit.as_secs(),
                })?,
        }
    }
}

/// Immediate subdirectories of `root`, sorted lexically
pub async fn list_batches(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut dirs = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }

    dirs.sort();
    Ok(dirs)
}
