//! Command-line arguments
//!
//! Every flag can also be supplied through the environment (and a `.env`
//! file loaded at startup).

use clap::Parser;
use std::path::PathBuf;

use crate::config::{
    Config, OverflowPolicy, ProxyConfig, Secret, StatusConfig, SyncConfig, DEFAULT_ADMIN_PATH,
    DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_EXPORT_PATH, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_OPEN_ATTEMPTS, DEFAULT_OPEN_RETRY_INTERVAL_SECS, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_PROXY_HOST, DEFAULT_PROXY_PORT, DEFAULT_SCHEMA_MARKER, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
    DEFAULT_STATUS_REQUEST_TIMEOUT_SECS, DEFAULT_UPSTREAM_URL, DEFAULT_WATCH_DIR,
};
use crate::storage::config::DEFAULT_S3_REGION;
use crate::storage::{BackendKind, StorageConfig};

/// dsync - export backup sidecar
#[derive(Parser, Debug)]
#[command(name = "dsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Bucket receiving the exported objects
    #[arg(long, env = "DSYNC_BUCKET_NAME")]
    pub bucket_name: String,

    /// Watch root containing export batch directories
    #[arg(long = "towatch", env = "DSYNC_WATCH_DIR", default_value = DEFAULT_WATCH_DIR)]
    pub watch_dir: PathBuf,

    /// Storage backend
    #[arg(long, env = "DSYNC_BACKEND", value_enum, default_value_t = BackendKind::S3)]
    pub backend: BackendKind,

    /// Object store endpoint
    #[arg(long, env = "DSYNC_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Object store region
    #[arg(long, env = "DSYNC_REGION", default_value = DEFAULT_S3_REGION)]
    pub region: String,

    /// Static access key (default credential chain when omitted)
    #[arg(long, env = "DSYNC_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// Static secret matching --access-key
    #[arg(long = "secret", env = "DSYNC_SECRET", hide_env_values = true)]
    pub secret_key: Option<Secret>,

    /// Use path-style bucket addressing
    #[arg(long, env = "DSYNC_PATH_STYLE")]
    pub path_style: bool,

    /// Service account JSON for the gcs backend
    #[arg(long, env = "DSYNC_GCS_SERVICE_ACCOUNT")]
    pub gcs_service_account: Option<PathBuf>,

    /// 32-byte data encryption key (SSE-C)
    #[arg(long, env = "DSYNC_CRYPTO_KEY", hide_env_values = true)]
    pub crypto_key: Option<Secret>,

    /// Request store-managed server-side encryption
    #[arg(long, env = "DSYNC_MANAGED_SSE")]
    pub managed_sse: bool,

    /// KMS key id for store-managed encryption
    #[arg(long, env = "DSYNC_KMS_KEY_ID")]
    pub kms_key_id: Option<String>,

    /// Proxy bind address
    #[arg(long, env = "DSYNC_HOST", default_value = DEFAULT_PROXY_HOST)]
    pub host: String,

    /// Proxy listening port
    #[arg(long, env = "DSYNC_PORT", default_value_t = DEFAULT_PROXY_PORT)]
    pub port: u16,

    /// Database admin endpoint behind the proxy
    #[arg(long, env = "DSYNC_UPSTREAM", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream: String,

    /// GraphQL admin path to tap for export mutations
    #[arg(long, env = "DSYNC_ADMIN_PATH", default_value = DEFAULT_ADMIN_PATH)]
    pub admin_path: String,

    /// Synchronous export path to tap
    #[arg(long, env = "DSYNC_EXPORT_PATH", default_value = DEFAULT_EXPORT_PATH)]
    pub export_path: String,

    /// Do not tap the GraphQL admin path
    #[arg(long, env = "DSYNC_NO_ADMIN_TAP")]
    pub no_admin_tap: bool,

    /// Do not tap the synchronous export path
    #[arg(long, env = "DSYNC_NO_EXPORT_TAP")]
    pub no_export_tap: bool,

    /// Pending export events before producers are held back
    #[arg(long, env = "DSYNC_CHANNEL_CAPACITY", default_value_t = DEFAULT_EVENT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Behavior when the event channel is full
    #[arg(long, env = "DSYNC_OVERFLOW", value_enum, default_value_t = OverflowPolicy::Block)]
    pub overflow: OverflowPolicy,

    /// Largest body the proxy buffers, in bytes
    #[arg(long, env = "DSYNC_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Seconds to wait for the pipeline on shutdown
    #[arg(long, env = "DSYNC_SHUTDOWN_TIMEOUT", default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    pub shutdown_timeout: u64,

    /// File name fragment of the schema marker skipped in each batch
    #[arg(long, env = "DSYNC_SCHEMA_MARKER", default_value = DEFAULT_SCHEMA_MARKER)]
    pub schema_marker: String,

    /// Exclusive open attempts per file
    #[arg(long, env = "DSYNC_OPEN_ATTEMPTS", default_value_t = DEFAULT_OPEN_ATTEMPTS)]
    pub open_attempts: u32,

    /// Seconds between exclusive open attempts
    #[arg(long, env = "DSYNC_OPEN_RETRY_INTERVAL", default_value_t = DEFAULT_OPEN_RETRY_INTERVAL_SECS)]
    pub open_retry_interval: u64,

    /// Seconds between task status polls
    #[arg(long, env = "DSYNC_POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval: u64,

    /// Timeout for one status request, in seconds
    #[arg(long, env = "DSYNC_STATUS_TIMEOUT", default_value_t = DEFAULT_STATUS_REQUEST_TIMEOUT_SECS)]
    pub status_timeout: u64,

    /// Give up waiting for an export task after this many seconds
    #[arg(long, env = "DSYNC_COMPLETION_TIMEOUT")]
    pub completion_timeout: Option<u64>,
}

impl Cli {
    pub fn into_config(self) -> Config {
        Config {
            proxy: ProxyConfig {
                host: self.host,
                port: self.port,
                upstream_url: self.upstream,
                admin_path: (!self.no_admin_tap).then_some(self.admin_path),
                export_path: (!self.no_export_tap).then_some(self.export_path),
                channel_capacity: self.channel_capacity,
                overflow: self.overflow,
                max_body_bytes: self.max_body_bytes,
                shutdown_timeout_secs: self.shutdown_timeout,
            },
            sync: SyncConfig {
                watch_dir: self.watch_dir,
                bucket: self.bucket_name,
                schema_marker: self.schema_marker,
                open_attempts: self.open_attempts,
                open_retry_interval_secs: self.open_retry_interval,
            },
            status: StatusConfig {
                poll_interval_secs: self.poll_interval,
                request_timeout_secs: self.status_timeout,
                completion_timeout_secs: self.completion_timeout,
            },
            storage: StorageConfig {
                backend: self.backend,
                endpoint: self.endpoint,
                region: self.region,
                access_key: self.access_key,
                secret_key: self.secret_key,
                path_style: self.path_style,
                gcs_service_account_path: self.gcs_service_account,
                crypto_key: self.crypto_key,
                managed_sse: self.managed_sse,
                kms_key_id: self.kms_key_id,
            },
        }
    }
}
