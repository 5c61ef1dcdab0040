use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use meshctl_common::error::Error;
use meshctl_common::ids::{
    ClusterId,
    RequestId,
};
use meshctl_common::protocol::ManagerMessage;
use tokio::sync::oneshot;
use tracing::{
    debug,
    warn,
};

use crate::connection::ConnectionManager;

/// Default on-demand request deadline, per spec.md §4.4.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One outstanding manager→edge request awaiting a reply.
///
/// `target_cluster` lets [`Correlator::on_cluster_disconnected`] find every
/// pending entry for a cluster without scanning payload contents.
struct PendingRequest {
    target_cluster: ClusterId,
    reply_tx: oneshot::Sender<Result<serde_json::Value, Error>>,
}

/// Pending-request table keyed by `RequestId`, with timeout and
/// disconnect-driven cancellation, grounded on `proxy/websocket_server.rs`'s
/// `pending_responses: HashMap<String, oneshot::Sender<TunnelMessage>>`.
pub struct Correlator {
    pending: DashMap<RequestId, PendingRequest>,
}

impl Correlator {
    pub fn new() -> Self {
        Correlator {
            pending: DashMap::new(),
        }
    }

    /// Allocates a request id, registers the waiter *before* enqueueing the
    /// envelope (so a synchronous reply can never race the insert), sends
    /// via the Connection Manager, and awaits the reply, the deadline, or a
    /// disconnect. The entry is removed on every exit path.
    pub async fn issue<F, T>(
        &self, connections: &ConnectionManager, cluster_id: &ClusterId, build_envelope: F, deadline: Duration,
    ) -> Result<T, Error>
    where
        F: FnOnce(RequestId) -> ManagerMessage,
        T: serde::de::DeserializeOwned,
    {
        let request_id = RequestId::new();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.pending.insert(
            request_id,
            PendingRequest {
                target_cluster: cluster_id.clone(),
                reply_tx,
            },
        );

        let envelope = build_envelope(request_id);
        if let Err(e) = connections.send_message_to_cluster(cluster_id, envelope) {
            self.pending.remove(&request_id);
            return Err(e);
        }

        let outcome = tokio::time::timeout(deadline, reply_rx).await;
        self.pending.remove(&request_id);

        match outcome {
            Ok(Ok(Ok(value))) => serde_json::from_value(value)
                .map_err(|e| Error::Internal(format!("malformed reply payload: {e}"))),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_cancelled)) => Err(Error::ClusterDisconnected(cluster_id.to_string())),
            Err(_elapsed) => Err(Error::Timeout),
        }
    }

    /// Delivers a reply to its waiter. A miss (timed out, or a disconnect
    /// already resolved it) is a normal race, logged and dropped rather than
    /// treated as an error.
    pub fn handle_response(&self, request_id: RequestId, result: Result<serde_json::Value, Error>) {
        match self.pending.remove(&request_id) {
            Some((_, pending)) => {
                let _ = pending.reply_tx.send(result);
            }
            None => debug!(%request_id, "late or unknown reply dropped"),
        }
    }

    /// Fails every pending request targeting `cluster_id` with
    /// `ClusterDisconnected`, releasing their waiters.
    pub fn on_cluster_disconnected(&self, cluster_id: &ClusterId) {
        let stale: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|entry| &entry.value().target_cluster == cluster_id)
            .map(|entry| *entry.key())
            .collect();

        for request_id in stale {
            if let Some((_, pending)) = self.pending.remove(&request_id) {
                warn!(%cluster_id, %request_id, "failing pending request: cluster disconnected");
                let _ = pending
                    .reply_tx
                    .send(Err(Error::ClusterDisconnected(cluster_id.to_string())));
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper wiring a `Correlator` and `ConnectionManager` together for
/// call sites, mirroring the spec's `Issue(kind, clusterId, payload,
/// deadline)` contract with concrete envelope builders.
pub async fn issue_proxy_config_request(
    correlator: &Correlator, connections: &ConnectionManager, cluster_id: &ClusterId, pod_namespace: String,
    pod_name: String, deadline: Duration,
) -> Result<meshctl_common::model::ProxyConfig, Error> {
    correlator
        .issue(
            connections,
            cluster_id,
            move |request_id| ManagerMessage::ProxyConfigRequest {
                request_id,
                pod_namespace,
                pod_name,
            },
            deadline,
        )
        .await
}

pub async fn issue_service_graph_metrics_request(
    correlator: &Correlator, connections: &ConnectionManager, cluster_id: &ClusterId,
    filters: meshctl_common::model::ServiceGraphFilters, start_time: chrono::DateTime<chrono::Utc>,
    end_time: chrono::DateTime<chrono::Utc>, deadline: Duration,
) -> Result<meshctl_common::model::ServiceGraphMetrics, Error> {
    correlator
        .issue(
            connections,
            cluster_id,
            move |request_id| ManagerMessage::ServiceGraphMetricsRequest {
                request_id,
                filters,
                start_time,
                end_time,
            },
            deadline,
        )
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc as StdArc;

    use meshctl_common::model::EdgeCapabilities;
    use tokio::sync::mpsc;

    use super::*;
    use crate::aggregator::Aggregator;
    use crate::connection::Session;

    fn cluster(name: &str) -> ClusterId {
        ClusterId::new(name).unwrap()
    }

    fn wire_up() -> (StdArc<ConnectionManager>, StdArc<Correlator>, mpsc::Receiver<ManagerMessage>) {
        let aggregator = StdArc::new(Aggregator::new());
        let connections = StdArc::new(ConnectionManager::new(aggregator));
        let (tx, rx) = mpsc::channel(16);
        let session = Arc::new(Session::new(
            cluster("prod-west"),
            EdgeCapabilities::default(),
            "127.0.0.1:9000".into(),
            tx,
        ));
        connections.register_connection(session).unwrap();
        (connections, StdArc::new(Correlator::new()), rx)
    }

    #[tokio::test]
    async fn issue_times_out_when_no_reply_arrives() {
        let (connections, correlator, mut rx) = wire_up();

        let issued = tokio::spawn({
            let connections = connections.clone();
            let correlator = correlator.clone();
            async move {
                correlator
                    .issue::<_, meshctl_common::model::ProxyConfig>(
                        &connections,
                        &cluster("prod-west"),
                        |request_id| ManagerMessage::ProxyConfigRequest {
                            request_id,
                            pod_namespace: "default".into(),
                            pod_name: "nginx-1".into(),
                        },
                        Duration::from_millis(20),
                    )
                    .await
            }
        });

        assert!(rx.recv().await.is_some());
        let result = issued.await.unwrap();
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn handle_response_delivers_to_waiter() {
        let (connections, correlator, mut rx) = wire_up();

        let issued = tokio::spawn({
            let connections = connections.clone();
            let correlator = correlator.clone();
            async move {
                correlator
                    .issue::<_, meshctl_common::model::ProxyConfig>(
                        &connections,
                        &cluster("prod-west"),
                        |request_id| ManagerMessage::ProxyConfigRequest {
                            request_id,
                            pod_namespace: "default".into(),
                            pod_name: "nginx-1".into(),
                        },
                        Duration::from_secs(5),
                    )
                    .await
            }
        });

        let envelope = rx.recv().await.unwrap();
        let request_id = match envelope {
            ManagerMessage::ProxyConfigRequest { request_id, .. } => request_id,
            other => panic!("unexpected envelope: {other:?}"),
        };

        let payload = serde_json::to_value(meshctl_common::model::ProxyConfig {
            raw_config: "{}".into(),
        })
        .unwrap();
        correlator.handle_response(request_id, Ok(payload));

        let result = issued.await.unwrap().unwrap();
        assert_eq!(result.raw_config, "{}");
    }

    #[tokio::test]
    async fn disconnect_fails_all_pending_requests_for_that_cluster() {
        let (connections, correlator, mut rx) = wire_up();

        let issued = tokio::spawn({
            let connections = connections.clone();
            let correlator = correlator.clone();
            async move {
                correlator
                    .issue::<_, meshctl_common::model::ProxyConfig>(
                        &connections,
                        &cluster("prod-west"),
                        |request_id| ManagerMessage::ProxyConfigRequest {
                            request_id,
                            pod_namespace: "default".into(),
                            pod_name: "nginx-1".into(),
                        },
                        Duration::from_secs(5),
                    )
                    .await
            }
        });

        assert!(rx.recv().await.is_some());
        correlator.on_cluster_disconnected(&cluster("prod-west"));

        let result = issued.await.unwrap();
        assert!(matches!(result, Err(Error::ClusterDisconnected(_))));
    }
}
