use std::sync::Arc;
use std::time::Duration;

use futures::{
    SinkExt,
    StreamExt,
};
use meshctl_common::error::Error;
use meshctl_common::ids::ClusterId;
use meshctl_common::protocol::{
    EdgeMessage,
    Frame,
    ManagerMessage,
};
use tokio::io::{
    AsyncRead,
    AsyncWrite,
};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{
    error,
    info,
    warn,
};

use crate::aggregator::Aggregator;
use crate::connection::{
    ConnectionManager,
    Session,
    OUTBOX_CAPACITY,
};
use crate::correlator::Correlator;

pub struct SessionServerConfig {
    pub max_message_size: usize,
    pub first_message_timeout: Duration,
}

impl Default for SessionServerConfig {
    fn default() -> Self {
        SessionServerConfig {
            max_message_size: 4 * 1024 * 1024,
            first_message_timeout: Duration::from_secs(10),
        }
    }
}

/// Accepts edge connections and drives each one through the
/// `[AwaitIdent] -> [Registering] -> [Active] -> [Terminated]` state machine
/// in spec.md §4.5, the way `proxy/websocket_server.rs`'s
/// `handle_tunnel_connection` splits the stream into a reader and a writer
/// task draining the session outbox.
pub struct SessionServer {
    pub connections: Arc<ConnectionManager>,
    pub aggregator: Arc<Aggregator>,
    pub correlator: Arc<Correlator>,
    config: SessionServerConfig,
}

impl SessionServer {
    pub fn new(
        connections: Arc<ConnectionManager>, aggregator: Arc<Aggregator>, correlator: Arc<Correlator>,
        config: SessionServerConfig,
    ) -> Self {
        SessionServer {
            connections,
            aggregator,
            correlator,
            config,
        }
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), Error> {
        loop {
            let (stream, peer_addr) = listener
                .accept()
                .await
                .map_err(|e| Error::Internal(format!("accept failed: {e}")))?;
            let remote_endpoint = peer_addr.to_string();
            let server = self.clone();
            tokio::spawn(async move {
                match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => server.handle_connection(ws, remote_endpoint).await,
                    Err(e) => warn!(%remote_endpoint, error = %e, "websocket handshake failed"),
                }
            });
        }
    }

    async fn handle_connection<S>(self: Arc<Self>, ws: WebSocketStream<S>, remote_endpoint: String)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut stream) = ws.split();

        // [AwaitIdent]
        let first = match tokio::time::timeout(self.config.first_message_timeout, stream.next()).await {
            Ok(Some(Ok(msg))) => msg,
            _ => {
                warn!(%remote_endpoint, "no identification received, closing");
                return;
            }
        };

        let (cluster_id, capabilities) = match Frame::decode_edge(&first) {
            Ok(EdgeMessage::ClusterIdentification {
                cluster_id,
                capabilities,
            }) => match ClusterId::new(cluster_id) {
                Ok(id) => (id, capabilities),
                Err(e) => {
                    let _ = send_error(&mut sink, "INVALID_CLUSTER_ID", &e.to_string(), self.config.max_message_size)
                        .await;
                    return;
                }
            },
            _ => {
                let _ = send_error(
                    &mut sink,
                    "UNKNOWN_MESSAGE",
                    "expected ClusterIdentification",
                    self.config.max_message_size,
                )
                .await;
                return;
            }
        };

        // [Registering]
        let (outbox_tx, mut outbox_rx) = tokio::sync::mpsc::channel(OUTBOX_CAPACITY);
        // Kept alongside the sender handed to the `Session` so the `[Active]`
        // loop can still enqueue a `ManagerMessage::Error` once `sink` has
        // been moved into the writer task below.
        let error_tx = outbox_tx.clone();
        let session = Arc::new(Session::new(
            cluster_id.clone(),
            capabilities,
            remote_endpoint.clone(),
            outbox_tx,
        ));

        let accepted = self.connections.register_connection(session).is_ok();
        let ack = Frame::encode_manager(
            &ManagerMessage::ConnectionAck { accepted },
            self.config.max_message_size,
        );
        if let Ok(frame) = ack {
            let _ = sink.send(frame).await;
        }
        if !accepted {
            warn!(%cluster_id, "rejected duplicate registration");
            return;
        }

        info!(%cluster_id, %remote_endpoint, "session active");

        let max_message_size = self.config.max_message_size;
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbox_rx.recv().await {
                match Frame::encode_manager(&msg, max_message_size) {
                    Ok(frame) => {
                        if sink.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "failed to encode outbound envelope"),
                }
            }
        });

        // [Active]
        while let Some(next) = stream.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(%cluster_id, error = %e, "transport error, closing session");
                    break;
                }
            };
            if matches!(msg, Message::Close(_)) {
                break;
            }

            let envelope = match Frame::decode_edge(&msg) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(%cluster_id, error = %e, "malformed envelope, closing session");
                    let _ = error_tx
                        .send(ManagerMessage::Error {
                            code: "UNKNOWN_MESSAGE".to_string(),
                            message: e.to_string(),
                        })
                        .await;
                    break;
                }
            };

            match envelope {
                EdgeMessage::ClusterState { snapshot } => {
                    if let Err(e) = self.connections.update_cluster_state(&cluster_id, snapshot).await {
                        error!(%cluster_id, error = %e, "failed to apply cluster state");
                    }
                }
                EdgeMessage::ProxyConfigResponse { request_id, result } => {
                    let result: Result<meshctl_common::model::ProxyConfig, String> = result.into();
                    self.correlator.handle_response(
                        request_id,
                        result
                            .map_err(Error::EdgeError)
                            .and_then(|v| serde_json::to_value(v).map_err(|e| Error::Internal(e.to_string()))),
                    );
                }
                EdgeMessage::ServiceGraphMetricsResponse { request_id, result } => {
                    let result: Result<meshctl_common::model::ServiceGraphMetrics, String> = result.into();
                    self.correlator.handle_response(
                        request_id,
                        result
                            .map_err(Error::EdgeError)
                            .and_then(|v| serde_json::to_value(v).map_err(|e| Error::Internal(e.to_string()))),
                    );
                }
                EdgeMessage::ClusterIdentification { .. } => {
                    warn!(%cluster_id, "unexpected re-identification, closing session");
                    let _ = error_tx
                        .send(ManagerMessage::Error {
                            code: "UNKNOWN_MESSAGE".to_string(),
                            message: "unexpected re-identification on an active session".to_string(),
                        })
                        .await;
                    break;
                }
            }
        }

        // [Terminated]
        // Drop both outbox senders (this one and the one owned by the
        // removed `Session`) before joining the writer so any `Error` frame
        // enqueued above actually reaches the wire instead of being
        // discarded by an abort.
        drop(error_tx);
        self.connections.unregister_connection(&cluster_id);
        let _ = writer.await;
        self.correlator.on_cluster_disconnected(&cluster_id);
        info!(%cluster_id, "session terminated");
    }
}

async fn send_error(
    sink: &mut (impl futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin), code: &str,
    message: &str, max_message_size: usize,
) -> Result<(), Error> {
    let envelope = ManagerMessage::Error {
        code: code.to_string(),
        message: message.to_string(),
    };
    let frame = Frame::encode_manager(&envelope, max_message_size)?;
    sink.send(frame)
        .await
        .map_err(|e| Error::Internal(format!("failed to send error frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = SessionServerConfig::default();
        assert_eq!(cfg.max_message_size, 4 * 1024 * 1024);
    }
}
