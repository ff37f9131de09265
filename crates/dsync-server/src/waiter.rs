//! Completion polling for asynchronous export tasks

use dsync_common::TaskStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use crate::error::WaitError;
use crate::status::TaskStatusSource;

/// Polls a [`TaskStatusSource`] at a fixed interval until the task ends.
///
/// Polling is unbounded; callers that need a deadline wrap [`wait`] in
/// `tokio::time::timeout`. A failed status query ends the wait at once.
///
/// [`wait`]: CompletionWaiter::wait
#[derive(Clone)]
pub struct CompletionWaiter {
    source: Arc<dyn TaskStatusSource>,
    poll_interval: Duration,
}

impl CompletionWaiter {
    pub fn new(source: Arc<dyn TaskStatusSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    pub async fn wait(&self, task_id: &str) -> Result<(), WaitError> {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;

            let status = self
                .source
                .task_status(task_id)
                .await
                .map_err(|source| WaitError::Status {
                    task_id: task_id.to_string(),
                    source,
                })?;

            info!(task_id, attempt, status = %status, "Polled export task");

            match status {
                TaskStatus::Success => return Ok(()),
                TaskStatus::Failed => {
                    return Err(WaitError::TaskFailed {
                        task_id: task_id.to_string(),
                    })
                },
                TaskStatus::Queued | TaskStatus::Running | TaskStatus::Unknown => {
                    sleep(self.poll_interval).await;
                },
            }
        }
    }
}
