//! Export trigger detection on proxied admin responses
//!
//! The tap only reads a copy of the response body. Anything it cannot decode
//! is logged and ignored; the client always gets the upstream response.

use dsync_common::ExportEvent;
use http::Method;
use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::config::{OverflowPolicy, ProxyConfig};
use crate::error::TapError;

/// `{"data":{"export":{"response":{"message":..,"code":..}}}}`
#[derive(Debug, Deserialize)]
struct ExportResponse {
    data: ExportData,
}

#[derive(Debug, Deserialize)]
struct ExportData {
    export: ExportField,
}

#[derive(Debug, Deserialize)]
struct ExportField {
    response: ExportMessage,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Task id from a message like `"Export queued with ID 0x125b3ab7a"`
pub fn task_id_from_message(message: &str) -> Option<&str> {
    message.split_whitespace().last()
}

/// Decode an export mutation response and return its task id
pub fn decode_export_response(body: &[u8]) -> Result<String, TapError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| TapError::NotExport)?;

    if value.pointer("/data/export").is_none() {
        return Err(TapError::NotExport);
    }

    let response: ExportResponse = serde_json::from_value(value)?;
    let message = response.data.export.response;

    if let Some(code) = &message.code {
        debug!(code = %code, message = %message.message, "Export mutation response");
    }

    task_id_from_message(&message.message)
        .map(str::to_owned)
        .ok_or(TapError::MissingTaskId(message.message))
}

/// Turns matching responses into [`ExportEvent`]s on the pipeline channel
#[derive(Debug, Clone)]
pub struct EventTap {
    sender: mpsc::Sender<ExportEvent>,
    admin_path: Option<String>,
    export_path: Option<String>,
    overflow: OverflowPolicy,
}

impl EventTap {
    pub fn new(
        sender: mpsc::Sender<ExportEvent>,
        admin_path: Option<String>,
        export_path: Option<String>,
        overflow: OverflowPolicy,
    ) -> Self {
        Self {
            sender,
            admin_path,
            export_path,
            overflow,
        }
    }

    pub fn from_config(sender: mpsc::Sender<ExportEvent>, config: &ProxyConfig) -> Self {
        Self::new(
            sender,
            config.admin_path.clone(),
            config.export_path.clone(),
            config.overflow,
        )
    }

    /// Whether a response to `method path` can carry an export trigger
    pub fn watches(&self, method: &Method, path: &str) -> bool {
        self.is_export_call(method, path) || self.is_admin_mutation(method, path)
    }

    fn is_export_call(&self, method: &Method, path: &str) -> bool {
        self.export_path.as_deref() == Some(path)
            && (*method == Method::GET || *method == Method::POST)
    }

    fn is_admin_mutation(&self, method: &Method, path: &str) -> bool {
        self.admin_path.as_deref() == Some(path) && *method == Method::POST
    }

    /// Event for a response to `method path`, if it is an export trigger
    pub fn inspect(&self, method: &Method, path: &str, body: &[u8]) -> Option<ExportEvent> {
        if self.is_export_call(method, path) {
            return Some(ExportEvent::completed());
        }

        if self.is_admin_mutation(method, path) {
            return match decode_export_response(body) {
                Ok(task_id) => Some(ExportEvent::with_task(task_id)),
                Err(TapError::NotExport) => {
                    debug!(path, "Admin response is not an export trigger");
                    None
                },
                Err(e) => {
                    warn!(path, error = %e, "Error while decoding export response body");
                    None
                },
            };
        }

        None
    }

    /// Inspect a response and hand any resulting event to the pipeline
    pub async fn observe(&self, method: &Method, path: &str, body: &[u8]) {
        if let Some(event) = self.inspect(method, path, body) {
            self.emit(event).await;
        }
    }

    async fn emit(&self, event: ExportEvent) {
        info!(
            event_id = %event.id,
            task_id = event.task_id.as_deref().unwrap_or("-"),
            "Export trigger observed"
        );

        match self.overflow {
            OverflowPolicy::Block => {
                if self.sender.send(event).await.is_err() {
                    warn!("Pipeline is stopped, export event discarded");
                }
            },
            OverflowPolicy::Drop => match self.sender.try_send(event) {
                Ok(()) => {},
                Err(TrySendError::Full(event)) => {
                    warn!(event_id = %event.id, "Pipeline busy, export event dropped");
                },
                Err(TrySendError::Closed(_)) => {
                    warn!("Pipeline is stopped, export event discarded");
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEUED: &[u8] =
        br#"{"data":{"export":{"response":{"message":"Export queued with ID 0x125b3ab7a","code":"Success"}}}}"#;

    fn tap(overflow: OverflowPolicy) -> (EventTap, mpsc::Receiver<ExportEvent>) {
        let (tx, rx) = mpsc::channel(1);
        (
            EventTap::new(
                tx,
                Some("/admin".to_string()),
                Some("/admin/export".to_string()),
                overflow,
            ),
            rx,
        )
    }

    #[test]
    fn test_task_id_is_last_word() {
        assert_eq!(
            task_id_from_message("Export queued with ID 0x125b3ab7a"),
            Some("0x125b3ab7a")
        );
        assert_eq!(task_id_from_message("  0x1  "), Some("0x1"));
        assert_eq!(task_id_from_message("   "), None);
    }

    #[test]
    fn test_decode_export_response() {
        assert_eq!(decode_export_response(QUEUED).unwrap(), "0x125b3ab7a");
    }

    #[test]
    fn test_decode_rejects_other_admin_responses() {
        for body in [
            &br#"{"data":{"task":{"status":"Running"}}}"#[..],
            br#"{"data":{"health":[{"status":"healthy"}]}}"#,
            br#"{"data":{"updateGQLSchema":{"gqlSchema":{"schema":"type A"}}}}"#,
            br#"{"errors":[{"message":"unauthorized"}]}"#,
            b"not json",
        ] {
            assert!(matches!(
                decode_export_response(body),
                Err(TapError::NotExport)
            ));
        }
    }

    #[test]
    fn test_decode_reports_unusable_export_responses() {
        let no_message = br#"{"data":{"export":{"response":{"code":"Success"}}}}"#;
        assert!(matches!(
            decode_export_response(no_message),
            Err(TapError::Decode(_))
        ));

        let empty = br#"{"data":{"export":{"response":{"message":""}}}}"#;
        assert!(matches!(
            decode_export_response(empty),
            Err(TapError::MissingTaskId(_))
        ));
    }

    #[test]
    fn test_inspect_paths_and_methods() {
        let (tap, _rx) = tap(OverflowPolicy::Block);

        let event = tap.inspect(&Method::POST, "/admin", QUEUED).unwrap();
        assert_eq!(event.task_id.as_deref(), Some("0x125b3ab7a"));

        let event = tap.inspect(&Method::GET, "/admin/export", b"").unwrap();
        assert!(event.task_id.is_none());

        assert!(tap.inspect(&Method::GET, "/admin", QUEUED).is_none());
        assert!(tap.inspect(&Method::DELETE, "/admin/export", b"").is_none());
        assert!(tap.inspect(&Method::POST, "/query", QUEUED).is_none());
        assert!(tap.inspect(&Method::POST, "/admin", b"not json").is_none());
    }

    #[test]
    fn test_watches_only_trigger_calls() {
        let (tap, _rx) = tap(OverflowPolicy::Block);

        assert!(tap.watches(&Method::POST, "/admin"));
        assert!(tap.watches(&Method::GET, "/admin/export"));
        assert!(tap.watches(&Method::POST, "/admin/export"));
        assert!(!tap.watches(&Method::GET, "/admin"));
        assert!(!tap.watches(&Method::POST, "/query"));
        assert!(!tap.watches(&Method::GET, "/state"));
    }

    #[test]
    fn test_disabled_paths_are_ignored() {
        let (tx, _rx) = mpsc::channel(1);
        let tap = EventTap::new(tx, None, Some("/admin/export".to_string()), OverflowPolicy::Block);
        assert!(tap.inspect(&Method::POST, "/admin", QUEUED).is_none());
    }

    #[tokio::test]
    async fn test_observe_emits_event() {
        let (tap, mut rx) = tap(OverflowPolicy::Block);

        tap.observe(&Method::POST, "/admin", QUEUED).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id.as_deref(), Some("0x125b3ab7a"));
    }

    #[tokio::test]
    async fn test_drop_policy_discards_when_full() {
        let (tap, mut rx) = tap(OverflowPolicy::Drop);

        tap.observe(&Method::POST, "/admin", QUEUED).await;
        tap.observe(&Method::GET, "/admin/export", b"").await;

        let first = rx.recv().await.unwrap();
        assert!(first.task_id.is_some());
        assert!(rx.try_recv().is_err());
    }
}
