//! Pipeline controller integration tests

mod common;

use common::*;
use dsync_common::{ExportEvent, TaskStatus};
use dsync_server::pipeline::{PassOutcome, PipelineController};
use dsync_server::waiter::CompletionWaiter;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const POLL: Duration = Duration::from_secs(5);

fn controller(
    status: Arc<ScriptedStatus>,
    backend: Arc<RecordingBackend>,
    root: &TempDir,
) -> PipelineController {
    PipelineController::new(
        CompletionWaiter::new(status, POLL),
        syncer(backend, impatient()),
        root.path().to_path_buf(),
    )
}

#[tokio::test]
async fn test_event_without_task_syncs_dirs_in_lexical_order() {
    let root = TempDir::new().unwrap();
    let second = write_batch(root.path(), "dgraph.r9.u0102");
    let first = write_batch(root.path(), "dgraph.r10.u0101");
    std::fs::write(root.path().join("stray.log"), b"ignored").unwrap();
    let status = ScriptedStatus::new();
    let backend = RecordingBackend::new();

    let report = controller(status.clone(), backend.clone(), &root)
        .handle_event(&ExportEvent::completed())
        .await;

    assert_eq!(report.synced(), &[first.clone(), second.clone()]);
    assert!(report.failed().is_empty());
    assert!(status.queries().is_empty(), "no task id means no polling");
    assert_eq!(backend.uploads().len(), 4);
    assert!(!first.exists() && !second.exists());
    assert!(root.path().join("stray.log").exists());
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_task_before_scanning() {
    let root = TempDir::new().unwrap();
    let dir = write_batch(root.path(), "batch");
    let status = ScriptedStatus::new().script(
        "0x1",
        &[TaskStatus::Queued, TaskStatus::Running, TaskStatus::Success],
    );
    let backend = RecordingBackend::new();

    let report = controller(status.clone(), backend.clone(), &root)
        .handle_event(&ExportEvent::with_task("0x1"))
        .await;

    assert_eq!(report.synced(), &[dir]);
    assert_eq!(status.queries(), vec!["0x1", "0x1", "0x1"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_task_skips_sync() {
    let root = TempDir::new().unwrap();
    let dir = write_batch(root.path(), "batch");
    let status = ScriptedStatus::new().script("0x2", &[TaskStatus::Running, TaskStatus::Failed]);
    let backend = RecordingBackend::new();

    let report = controller(status.clone(), backend.clone(), &root)
        .handle_event(&ExportEvent::with_task("0x2"))
        .await;

    assert_eq!(report.outcome, PassOutcome::WaitFailed);
    assert!(backend.uploads().is_empty());
    assert!(dir.exists());
}

#[tokio::test(start_paused = true)]
async fn test_completion_timeout_skips_sync() {
    let root = TempDir::new().unwrap();
    let dir = write_batch(root.path(), "batch");
    let status = ScriptedStatus::new();
    let backend = RecordingBackend::new();

    let report = controller(status.clone(), backend.clone(), &root)
        .with_completion_timeout(Some(Duration::from_secs(12)))
        .handle_event(&ExportEvent::with_task("0x3"))
        .await;

    assert_eq!(report.outcome, PassOutcome::WaitFailed);
    assert_eq!(status.queries().len(), 3);
    assert!(dir.exists());
}

#[tokio::test]
async fn test_failed_dir_does_not_stop_siblings() {
    let root = TempDir::new().unwrap();
    let blocked = write_batch(root.path(), "a");
    let healthy = write_batch(root.path(), "b");
    let _writer = hold_lock(&blocked.join("g01.schema.gz"));
    let backend = RecordingBackend::new();

    let report = controller(ScriptedStatus::new(), backend.clone(), &root)
        .handle_event(&ExportEvent::completed())
        .await;

    assert_eq!(report.synced(), &[healthy.clone()]);
    assert_eq!(report.failed(), &[blocked.clone()]);
    assert!(blocked.exists());
    assert!(!healthy.exists());
}

#[tokio::test]
async fn test_missing_watch_root_is_reported() {
    let root = TempDir::new().unwrap();
    let backend = RecordingBackend::new();
    let controller = PipelineController::new(
        CompletionWaiter::new(ScriptedStatus::new(), POLL),
        syncer(backend, impatient()),
        root.path().join("absent"),
    );

    let report = controller.handle_event(&ExportEvent::completed()).await;

    assert_eq!(report.outcome, PassOutcome::ListingFailed);
}

#[tokio::test(start_paused = true)]
async fn test_events_are_handled_one_at_a_time_in_order() {
    let root = TempDir::new().unwrap();
    write_batch(root.path(), "batch");
    let status = ScriptedStatus::new()
        .script("0x1", &[TaskStatus::Running, TaskStatus::Success])
        .script("0x2", &[TaskStatus::Success]);
    let backend = RecordingBackend::new();

    let (tx, rx) = mpsc::channel(2);
    let worker = controller(status.clone(), backend.clone(), &root).spawn(rx);

    tx.send(ExportEvent::with_task("0x1")).await.unwrap();
    tx.send(ExportEvent::with_task("0x2")).await.unwrap();
    drop(tx);

    worker.await.unwrap();

    // The second wait starts only after the first pass finished
    assert_eq!(status.queries(), vec!["0x1", "0x1", "0x2"]);
    assert_eq!(backend.uploads().len(), 2);
}

#[tokio::test]
async fn test_controller_stops_when_channel_closes() {
    let root = TempDir::new().unwrap();
    let (tx, rx) = mpsc::channel::<ExportEvent>(1);
    let worker = controller(ScriptedStatus::new(), RecordingBackend::new(), &root).spawn(rx);

    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("controller should exit once all senders are dropped")
        .unwrap();
}
