//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::StorageConfig;

// ============================================================================
// Proxy Configuration Constants
// ============================================================================

/// Default proxy host binding.
pub const DEFAULT_PROXY_HOST: &str = "0.0.0.0";

/// Default proxy port.
pub const DEFAULT_PROXY_PORT: u16 = 10080;

/// Default database admin endpoint the proxy forwards to.
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8080";

/// GraphQL admin path carrying export mutations and task queries.
pub const DEFAULT_ADMIN_PATH: &str = "/admin";

/// Synchronous export trigger path.
pub const DEFAULT_EXPORT_PATH: &str = "/admin/export";

/// Default number of pending export events before producers wait.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1;

/// Largest request or response body the proxy buffers (256 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Sync Configuration Constants
// ============================================================================

/// Default watch root for export batches.
pub const DEFAULT_WATCH_DIR: &str = "/dgraph/export";

/// File name fragment identifying the schema marker inside a batch.
pub const DEFAULT_SCHEMA_MARKER: &str = "gql_schema";

/// Exclusive open attempts before a file is considered not ready.
pub const DEFAULT_OPEN_ATTEMPTS: u32 = 10;

/// Seconds between exclusive open attempts.
pub const DEFAULT_OPEN_RETRY_INTERVAL_SECS: u64 = 5;

// ============================================================================
// Status Configuration Constants
// ============================================================================

/// Seconds between task status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Timeout for a single status request in seconds.
pub const DEFAULT_STATUS_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Sidecar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub sync: SyncConfig,
    pub status: StatusConfig,
    pub storage: StorageConfig,
}

/// What a producer does when the event channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Hold the client response until the controller accepts the event
    #[default]
    Block,
    /// Log and discard the event
    Drop,
}

/// Proxy and event tap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub upstream_url: String,
    /// `None` disables the GraphQL export tap
    pub admin_path: Option<String>,
    /// `None` disables the synchronous export tap
    pub export_path: Option<String>,
    pub channel_capacity: usize,
    pub overflow: OverflowPolicy,
    pub max_body_bytes: usize,
    pub shutdown_timeout_secs: u64,
}

/// Directory sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub watch_dir: PathBuf,
    pub bucket: String,
    pub schema_marker: String,
    pub open_attempts: u32,
    pub open_retry_interval_secs: u64,
}

/// Task status polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Upper bound on one completion wait; unbounded when `None`
    pub completion_timeout_secs: Option<u64>,
}

impl SyncConfig {
    pub fn open_retry_interval(&self) -> Duration {
        Duration::from_secs(self.open_retry_interval_secs)
    }
}

impl StatusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.proxy.port == 0 {
            anyhow::bail!("Proxy port must be greater than 0");
        }

        reqwest::Url::parse(&self.proxy.upstream_url).map_err(|e| {
            anyhow::anyhow!("Invalid upstream URL '{}': {}", self.proxy.upstream_url, e)
        })?;

        for path in [&self.proxy.admin_path, &self.proxy.export_path]
            .into_iter()
            .flatten()
        {
            if !path.starts_with('/') {
                anyhow::bail!("Tapped path '{}' must start with '/'", path);
            }
        }

        if self.proxy.admin_path.is_none() && self.proxy.export_path.is_none() {
            tracing::warn!("No export trigger path configured - nothing will be synchronized");
        }

        if self.proxy.channel_capacity == 0 {
            anyhow::bail!("Event channel capacity must be greater than 0");
        }

        if self.sync.bucket.is_empty() {
            anyhow::bail!("Bucket name cannot be empty");
        }

        if self.sync.schema_marker.is_empty() {
            anyhow::bail!("Schema marker cannot be empty");
        }

        if self.sync.open_attempts == 0 {
            anyhow::bail!("Open attempts must be greater than 0");
        }

        if self.status.poll_interval_secs == 0 {
            anyhow::bail!("Status poll interval must be greater than 0");
        }

        self.storage.validate()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig {
                host: DEFAULT_PROXY_HOST.to_string(),
                port: DEFAULT_PROXY_PORT,
                upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
                admin_path: Some(DEFAULT_ADMIN_PATH.to_string()),
                export_path: Some(DEFAULT_EXPORT_PATH.to_string()),
                channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
                overflow: OverflowPolicy::Block,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            sync: SyncConfig {
                watch_dir: PathBuf::from(DEFAULT_WATCH_DIR),
                bucket: String::new(),
                schema_marker: DEFAULT_SCHEMA_MARKER.to_string(),
                open_attempts: DEFAULT_OPEN_ATTEMPTS,
                open_retry_interval_secs: DEFAULT_OPEN_RETRY_INTERVAL_SECS,
            },
            status: StatusConfig {
                poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
                request_timeout_secs: DEFAULT_STATUS_REQUEST_TIMEOUT_SECS,
                completion_timeout_secs: None,
            },
            storage: StorageConfig::default(),
        }
    }
}

/// String that never shows up in `Debug` output or logs
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

impl std::str::FromStr for Secret {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
