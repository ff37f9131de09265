//! Export task status queries against the database admin endpoint

use async_trait::async_trait;
use dsync_common::TaskStatus;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::StatusError;

/// Source of task status values
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, StatusError>;
}

/// GraphQL client for `task(input: {id}) { status }`
#[derive(Clone)]
pub struct AdminClient {
    client: Client,
    admin_url: String,
}

impl AdminClient {
    pub fn new(
        upstream_url: &str,
        admin_path: &str,
        timeout: Duration,
    ) -> Result<Self, StatusError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            admin_url: format!("{}{}", upstream_url.trim_end_matches('/'), admin_path),
        })
    }

    pub fn admin_url(&self) -> &str {
        &self.admin_url
    }
}

#[async_trait]
impl TaskStatusSource for AdminClient {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, StatusError> {
        debug!(task_id, url = %self.admin_url, "Querying export task status");

        let response = self
            .client
            .post(&self.admin_url)
            .json(&json!({ "query": status_query(task_id) }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StatusError::Http(response.status()));
        }

        let body = response.bytes().await?;
        decode_status(&body)
    }
}

/// GraphQL document asking for the status of one task
pub fn status_query(task_id: &str) -> String {
    // JSON string literals are valid GraphQL string literals
    let id = serde_json::Value::String(task_id.to_owned());
    format!("query {{ task(input: {{id: {id}}}) {{ status }} }}")
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    data: Option<StatusData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    task: Option<TaskField>,
}

#[derive(Debug, Deserialize)]
struct TaskField {
    status: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// Decode a `data.task.status` payload
pub fn decode_status(body: &[u8]) -> Result<TaskStatus, StatusError> {
    let response: StatusResponse =
        serde_json::from_slice(body).map_err(|e| StatusError::Decode(e.to_string()))?;

    match response.data.and_then(|data| data.task) {
        Some(task) => Ok(TaskStatus::from_wire(&task.status)),
        None if !response.errors.is_empty() => Err(StatusError::Decode(
            response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )),
        None => Err(StatusError::Decode("response has no data.task".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_query() {
        assert_eq!(
            status_query("0x125b3ab7a"),
            r#"query { task(input: {id: "0x125b3ab7a"}) { status } }"#
        );
    }

    #[test]
    fn test_status_query_escapes_quotes() {
        assert!(status_query(r#"a"b"#).contains(r#""a\"b""#));
    }

    #[test]
    fn test_decode_status_values() {
        for (wire, expected) in [
            ("Queued", TaskStatus::Queued),
            ("Running", TaskStatus::Running),
            ("Success", TaskStatus::Success),
            ("Failed", TaskStatus::Failed),
            ("Unknown", TaskStatus::Unknown),
        ] {
            let body = format!(r#"{{"data":{{"task":{{"status":"{wire}"}}}}}}"#);
            assert_eq!(decode_status(body.as_bytes()).unwrap(), expected);
        }
    }

    #[test]
    fn test_decode_graphql_errors() {
        let body = br#"{"errors":[{"message":"task not found"}],"data":null}"#;
        match decode_status(body) {
            Err(StatusError::Decode(message)) => assert_eq!(message, "task not found"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_body() {
        assert!(matches!(
            decode_status(b"<html>bad gateway</html>"),
            Err(StatusError::Decode(_))
        ));
        assert!(matches!(
            decode_status(br#"{"data":{}}"#),
            Err(StatusError::Decode(_))
        ));
    }

    #[test]
    fn test_admin_url() {
        let client =
            AdminClient::new("http://alpha:8080/", "/admin", Duration::from_secs(1)).unwrap();
        assert_eq!(client.admin_url(), "http://alpha:8080/admin");
    }
}
