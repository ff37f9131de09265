//! dsync - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use dsync_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, sync::mpsc};
use tracing::{info, warn};

use dsync_server::{
    cli::Cli,
    config::DEFAULT_ADMIN_PATH,
    pipeline::PipelineController,
    proxy::{self, EventTap, ProxyState},
    status::AdminClient,
    storage,
    syncer::{DirectorySyncer, ReadinessPolicy},
    waiter::CompletionWaiter,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("dsync")
        .filter_directives("dsync_server=debug,tower_http=info,aws_config=warn,aws_smithy_runtime=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting dsync");

    let config = cli.into_config();
    config.validate().context("Invalid configuration")?;

    info!(
        backend = %config.storage.backend,
        bucket = %config.sync.bucket,
        watch_dir = %config.sync.watch_dir.display(),
        upstream = %config.proxy.upstream_url,
        "Configuration loaded"
    );

    let backend = storage::build_backend(&config.storage).await?;
    let encryption = config.storage.encryption()?;
    info!(encryption = encryption.mode(), "Upload encryption configured");

    let admin = AdminClient::new(
        &config.proxy.upstream_url,
        config.proxy.admin_path.as_deref().unwrap_or(DEFAULT_ADMIN_PATH),
        config.status.request_timeout(),
    )
    .context("Failed to build status client")?;

    let waiter = CompletionWaiter::new(Arc::new(admin), config.status.poll_interval());
    let syncer = DirectorySyncer::new(
        backend,
        config.sync.bucket.clone(),
        encryption,
        config.sync.schema_marker.clone(),
        ReadinessPolicy {
            attempts: config.sync.open_attempts,
            interval: config.sync.open_retry_interval(),
        },
    );

    let (events_tx, events_rx) = mpsc::channel(config.proxy.channel_capacity);

    let worker = PipelineController::new(waiter, syncer, config.sync.watch_dir.clone())
        .with_completion_timeout(config.status.completion_timeout())
        .spawn(events_rx);

    // The tap owns the only sender; dropping the proxy state closes the channel
    let tap = EventTap::from_config(events_tx, &config.proxy);
    let state = ProxyState::new(&config.proxy, tap)?;

    let addr: SocketAddr = format!("{}:{}", config.proxy.host, config.proxy.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    proxy::serve(listener, state, shutdown_signal()).await?;

    info!("Proxy stopped, waiting for the pipeline to finish its current event");

    let shutdown_timeout = Duration::from_secs(config.proxy.shutdown_timeout_secs);
    match tokio::time::timeout(shutdown_timeout, worker).await {
        Ok(Ok(())) => info!("dsync shut down gracefully"),
        Ok(Err(e)) => warn!(error = %e, "Pipeline task ended abnormally"),
        Err(_) => warn!(
            timeout_secs = config.proxy.shutdown_timeout_secs,
            "Pipeline still busy at shutdown, exiting anyway"
        ),
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
