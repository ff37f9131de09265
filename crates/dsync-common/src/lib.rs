//! dsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the dsync workspace.
//!
//! # Overview
//!
//! - **Types**: export events, task status values and the object naming rules
//!   used when exported files are uploaded
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Error Handling**: common error and result types
//!
//! # Example
//!
//! ```
//! use dsync_common::types::{object_key_for, TaskStatus};
//!
//! assert_eq!(object_key_for("g01.rdf.gz"), "transformer.rdf.gz");
//! assert!("Success".parse::<TaskStatus>().unwrap().is_terminal());
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{DsyncError, Result};
pub use types::{ExportEvent, TaskStatus};
