use std::sync::Arc;
use std::time::Duration;

use futures::{
    SinkExt,
    StreamExt,
};
use meshctl_common::error::Error;
use meshctl_common::ids::ClusterId;
use meshctl_common::model::EdgeCapabilities;
use meshctl_common::protocol::{
    EdgeMessage,
    Frame,
    ManagerMessage,
};
use tokio_tungstenite::tungstenite::Message;
use tracing::{
    error,
    info,
    warn,
};

use crate::backoff::BackoffPolicy;
use crate::handlers::{
    self,
    ClusterStateProvider,
    MetricsProvider,
    ProxyConfigFetcher,
};

pub struct SessionClientConfig {
    pub manager_url: String,
    pub cluster_id: ClusterId,
    pub capabilities: EdgeCapabilities,
    pub max_message_size: usize,
    pub sync_interval: Duration,
    pub backoff: BackoffPolicy,
}

/// Edge-side session: one sync task pushing `ClusterState` on a timer, one
/// receive loop dispatching on-demand requests, wired together the way
/// `expose/websocket_client.rs`'s `start()`/`connect_and_run()` split
/// reconnect-supervision from per-connection I/O — generalized to the
/// redesigned 1s/doubling/5-attempt backoff contract of spec.md §4.6.
pub struct SessionClient {
    config: SessionClientConfig,
    state_provider: Arc<dyn ClusterStateProvider>,
    proxy_config_fetcher: Arc<dyn ProxyConfigFetcher>,
    metrics_provider: Option<Arc<dyn MetricsProvider>>,
}

impl SessionClient {
    pub fn new(
        config: SessionClientConfig, state_provider: Arc<dyn ClusterStateProvider>,
        proxy_config_fetcher: Arc<dyn ProxyConfigFetcher>, metrics_provider: Option<Arc<dyn MetricsProvider>>,
    ) -> Self {
        SessionClient {
            config,
            state_provider,
            proxy_config_fetcher,
            metrics_provider,
        }
    }

    /// Runs forever, reconnecting on retriable transport failures. Returns
    /// an error only when the backoff budget is exhausted or a
    /// non-retriable failure (e.g. a rejected registration) is hit —
    /// callers should treat that as fatal and let their supervisor restart
    /// the process.
    pub async fn run(&self) -> Result<(), Error> {
        let mut attempt = 0u32;
        loop {
            match self.connect_and_run().await {
                Ok(()) => {
                    info!("session ended gracefully");
                    attempt = 0;
                }
                Err(e) if e.is_retriable() => {
                    attempt += 1;
                    match self.config.backoff.delay_for_attempt(attempt) {
                        Some(delay) => {
                            warn!(error = %e, attempt, delay_secs = delay.as_secs(), "reconnecting");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(error = %e, "exhausted reconnect attempts, aborting");
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "non-retriable error, aborting");
                    return Err(e);
                }
            }
        }
    }

    async fn connect_and_run(&self) -> Result<(), Error> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(self.config.manager_url.as_str())
            .await
            .map_err(|e| RetriableError::Transport(e.to_string()))?;
        info!(manager_url = %self.config.manager_url, "connected to manager");

        let (mut sink, mut stream) = ws_stream.split();

        let identify = EdgeMessage::ClusterIdentification {
            cluster_id: self.config.cluster_id.to_string(),
            capabilities: self.config.capabilities,
        };
        let frame = Frame::encode_edge(&identify, self.config.max_message_size)?;
        sink.send(frame).await.map_err(|e| RetriableError::Transport(e.to_string()))?;

        let ack = stream
            .next()
            .await
            .ok_or_else(|| RetriableError::Transport("connection closed before ack".into()))?
            .map_err(|e| RetriableError::Transport(e.to_string()))?;
        match Frame::decode_manager(&ack) {
            Ok(ManagerMessage::ConnectionAck { accepted: true }) => {}
            Ok(ManagerMessage::ConnectionAck { accepted: false }) => {
                return Err(Error::AlreadyExists(self.config.cluster_id.to_string()));
            }
            other => {
                return Err(RetriableError::Transport(format!("unexpected handshake reply: {other:?}")).into());
            }
        }
        info!(cluster_id = %self.config.cluster_id, "registered with manager");

        let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel::<EdgeMessage>();

        let sync_task = {
            let outbound_tx = outbound_tx.clone();
            let state_provider = self.state_provider.clone();
            let sync_interval = self.config.sync_interval;
            tokio::spawn(async move {
                loop {
                    match state_provider.get_cluster_state().await {
                        Ok(snapshot) => {
                            let _ = outbound_tx.send(EdgeMessage::ClusterState { snapshot });
                        }
                        Err(e) => warn!(error = %e, "failed to collect cluster state, will retry next tick"),
                    }
                    tokio::time::sleep(sync_interval).await;
                }
            })
        };

        let max_message_size = self.config.max_message_size;
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                match Frame::encode_edge(&msg, max_message_size) {
                    Ok(frame) => {
                        if sink.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "failed to encode outbound envelope"),
                }
            }
        });

        let result = self.receive_loop(&mut stream, &outbound_tx).await;

        sync_task.abort();
        drop(outbound_tx);
        let _ = writer_task.await;

        result
    }

    async fn receive_loop(
        &self, stream: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
        outbound_tx: &tokio::sync::mpsc::UnboundedSender<EdgeMessage>,
    ) -> Result<(), Error> {
        while let Some(next) = stream.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => return Err(RetriableError::Transport(e.to_string()).into()),
            };
            if matches!(msg, Message::Close(_)) {
                return Ok(());
            }

            let envelope = match Frame::decode_manager(&msg) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "malformed envelope from manager, ignoring");
                    continue;
                }
            };

            let response = match envelope {
                ManagerMessage::ProxyConfigRequest {
                    request_id,
                    pod_namespace,
                    pod_name,
                } => Some(
                    handlers::handle_proxy_config_request(
                        self.proxy_config_fetcher.as_ref(),
                        request_id,
                        &pod_namespace,
                        &pod_name,
                    )
                    .await,
                ),
                ManagerMessage::ServiceGraphMetricsRequest {
                    request_id,
                    filters,
                    start_time,
                    end_time,
                } => Some(
                    handlers::handle_service_graph_metrics_request(
                        self.metrics_provider.as_deref(),
                        request_id,
                        filters,
                        start_time,
                        end_time,
                    )
                    .await,
                ),
                ManagerMessage::ConnectionAck { .. } => {
                    warn!("unexpected ConnectionAck on an active session, ignoring");
                    None
                }
                ManagerMessage::Error { code, message } => {
                    warn!(%code, %message, "manager reported an error");
                    None
                }
            };

            if let Some(response) = response {
                let _ = outbound_tx.send(response);
            }
        }
        Ok(())
    }
}

/// Classifies a session failure as retriable (reconnect with backoff) or
/// fatal (abort the edge), per spec.md §4.6.
#[derive(Debug, thiserror::Error)]
enum RetriableError {
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<RetriableError> for Error {
    fn from(e: RetriableError) -> Self {
        Error::EdgeError(e.to_string())
    }
}

trait ErrorRetriability {
    fn is_retriable(&self) -> bool;
}

impl ErrorRetriability for Error {
    fn is_retriable(&self) -> bool {
        !matches!(self, Error::AlreadyExists(_))
    }
}
