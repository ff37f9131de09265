//! dsync Server Library
//!
//! Backup sidecar for a graph database export directory.
//!
//! # Overview
//!
//! The sidecar sits in front of the database admin endpoint as a transparent
//! reverse proxy. When it sees an export being triggered it waits for the
//! export task to finish, uploads every completed export batch to object
//! storage, and removes each batch once all of its files are stored.
//!
//! - **Proxy**: forwards all traffic, taps export responses ([`proxy`])
//! - **Pipeline**: single consumer of export events ([`pipeline`])
//! - **Waiter**: polls the admin endpoint for task completion ([`waiter`])
//! - **Syncer**: uploads and cleans up one batch directory ([`syncer`])
//! - **Storage**: S3 SSE-C, MinIO and GCS backends ([`storage`])
//!
//! # Example
//!
//! ```no_run
//! use dsync_server::{
//!     pipeline::PipelineController, status::AdminClient, storage, syncer::DirectorySyncer,
//!     syncer::ReadinessPolicy, waiter::CompletionWaiter, Config,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let backend = storage::build_backend(&config.storage).await?;
//!     let admin = AdminClient::new(
//!         &config.proxy.upstream_url,
//!         "/admin",
//!         config.status.request_timeout(),
//!     )?;
//!     let waiter = CompletionWaiter::new(Arc::new(admin), config.status.poll_interval());
//!     let syncer = DirectorySyncer::new(
//!         backend,
//!         "backups",
//!         config.storage.encryption()?,
//!         "gql_schema",
//!         ReadinessPolicy::default(),
//!     );
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(1);
//!     let worker = PipelineController::new(waiter, syncer, config.sync.watch_dir).spawn(rx);
//!     drop(tx);
//!     worker.await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod proxy;
pub mod status;
pub mod storage;
pub mod syncer;
pub mod waiter;

// Re-export commonly used types
pub use config::Config;
pub use error::{StatusError, SyncError, SyncResult, TapError, UploadError, WaitError};
pub use pipeline::{PassOutcome, PassReport, PipelineController};
pub use storage::StorageBackend;
