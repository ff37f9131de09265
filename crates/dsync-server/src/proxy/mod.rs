//! Transparent reverse proxy in front of the database admin endpoint
//!
//! Every request except the sidecar health check is forwarded upstream
//! unchanged. Successful responses to export trigger calls are buffered up
//! to `max_body_bytes` and shown to the [`EventTap`]; every other response
//! is streamed straight back. Clients always get the upstream status,
//! headers, and body.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{stream, StreamExt};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};

use crate::config::ProxyConfig;

pub mod tap;

pub use tap::EventTap;

/// Sidecar health route; never forwarded
pub const HEALTH_PATH: &str = "/_dsync/health";

/// State shared by proxy handlers
#[derive(Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    upstream: Arc<str>,
    tap: Arc<EventTap>,
    max_body_bytes: usize,
}

impl ProxyState {
    pub fn new(config: &ProxyConfig, tap: EventTap) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            upstream: Arc::from(config.upstream_url.trim_end_matches('/')),
            tap: Arc::new(tap),
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// Create the proxy router
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .fallback(forward)
        .with_state(state)
        .layer(tracing_layer())
}

/// Serve the proxy on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: ProxyState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        addr = %listener.local_addr()?,
        upstream = %state.upstream,
        "Proxy listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Proxy server failed")?;

    Ok(())
}

/// Request tracing for proxied traffic
pub fn tracing_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Micros),
        )
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn forward(State(state): State<ProxyState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_owned();

    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path = %path, error = %e, "Error while reading request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        },
    };

    let target = format!(
        "{}{}",
        state.upstream,
        parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    );

    let upstream = state
        .client
        .request(parts.method.clone(), &target)
        .headers(forwarded_headers(&parts.headers))
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => {
            error!(path = %path, error = %e, "Upstream request failed");
            return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response();
        },
    };

    let status = upstream.status();
    let headers = forwarded_headers(upstream.headers());

    let body = if status.is_success() && state.tap.watches(&parts.method, &path) {
        match buffer_response(upstream, state.max_body_bytes).await {
            Ok(Buffered::Complete(bytes)) => {
                state.tap.observe(&parts.method, &path, &bytes).await;
                Body::from(bytes)
            },
            Ok(Buffered::Oversized(body)) => {
                warn!(
                    path = %path,
                    limit = state.max_body_bytes,
                    "Export response exceeds buffer limit, not inspected"
                );
                body
            },
            Err(e) => {
                error!(path = %path, error = %e, "Error while reading response body");
                return (StatusCode::BAD_GATEWAY, "upstream response interrupted").into_response();
            },
        }
    } else {
        Body::from_stream(upstream.bytes_stream())
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

enum Buffered {
    Complete(Bytes),
    /// Larger than the limit; streams the bytes read so far and the rest
    Oversized(Body),
}

/// Read `upstream` fully unless it grows past `limit` bytes
async fn buffer_response(
    mut upstream: reqwest::Response,
    limit: usize,
) -> reqwest::Result<Buffered> {
    if upstream.content_length().is_some_and(|len| len > limit as u64) {
        return Ok(Buffered::Oversized(Body::from_stream(upstream.bytes_stream())));
    }

    let mut buffer = Vec::new();

    while let Some(chunk) = upstream.chunk().await? {
        buffer.extend_from_slice(&chunk);

        if buffer.len() > limit {
            let head = Bytes::from(buffer);
            let rest = stream::once(async move { Ok::<_, reqwest::Error>(head) })
                .chain(upstream.bytes_stream());
            return Ok(Buffered::Oversized(Body::from_stream(rest)));
        }
    }

    Ok(Buffered::Complete(Bytes::from(buffer)))
}

/// Copy of `headers` without hop-by-hop fields and `Host`
fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::HOST
        || name == header::PROXY_AUTHENTICATE
        || name == header::PROXY_AUTHORIZATION
        || name == header::TE
        || name == header::TRAILER
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
        || name.as_str() == "keep-alive"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::HOST, HeaderValue::from_static("proxy:10080"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-dgraph-accesstoken", HeaderValue::from_static("token"));

        let forwarded = forwarded_headers(&headers);

        assert_eq!(forwarded.len(), 2);
        assert!(forwarded.contains_key(header::CONTENT_TYPE));
        assert!(forwarded.contains_key("x-dgraph-accesstoken"));
    }
}
