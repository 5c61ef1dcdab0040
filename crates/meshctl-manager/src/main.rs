use std::sync::Arc;

use meshctl_common::config::ControlPlaneConfig;
use meshctl_manager::{
    http_api,
    Aggregator,
    ConnectionManager,
    Correlator,
    FrontendApi,
    SessionServer,
    SessionServerConfig,
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{
    error,
    info,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ControlPlaneConfig::from_env()?;
    info!(?config, "starting mesh control plane manager");

    let aggregator = Arc::new(Aggregator::new());
    let connections = Arc::new(ConnectionManager::new(aggregator.clone()));
    let correlator = Arc::new(Correlator::new());

    let sync_interval = chrono::Duration::from_std(config.sync_interval)
        .unwrap_or_else(|_| chrono::Duration::seconds(ControlPlaneConfig::DEFAULT_SYNC_INTERVAL_SECS as i64));
    let frontend = Arc::new(FrontendApi::new(
        connections.clone(),
        aggregator.clone(),
        correlator.clone(),
        sync_interval,
    ));

    let session_server = Arc::new(SessionServer::new(
        connections,
        aggregator,
        correlator,
        SessionServerConfig {
            max_message_size: config.max_message_size,
            ..SessionServerConfig::default()
        },
    ));

    let ws_listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let http_listener = TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    info!(port = config.port, http_port = config.http_port, "listening");

    let ws_handle = tokio::spawn(async move { session_server.serve(ws_listener).await });
    let http_handle = tokio::spawn(async move { http_api::serve(frontend, http_listener).await });

    #[cfg(unix)]
    {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("received Ctrl+C signal");
            }
            _ = async {
                if let Ok(mut sigterm) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    let _ = sigterm.recv().await;
                    info!("received SIGTERM signal");
                }
            } => {}
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.ok();
        info!("received Ctrl+C signal");
    }

    ws_handle.abort();
    http_handle.abort();

    if let Err(e) = ws_handle.await {
        if !e.is_cancelled() {
            error!(error = %e, "session server task failed");
        }
    }
    if let Err(e) = http_handle.await {
        if !e.is_cancelled() {
            error!(error = %e, "http api task failed");
        }
    }

    info!("manager shutdown complete");
    Ok(())
}
