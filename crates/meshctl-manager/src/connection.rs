use std::sync::atomic::{
    AtomicU64,
    Ordering,
};
use std::sync::Arc;

use chrono::{
    DateTime,
    Utc,
};
use dashmap::DashMap;
use meshctl_common::error::Error;
use meshctl_common::ids::ClusterId;
use meshctl_common::model::{
    ClusterSyncInfo,
    EdgeCapabilities,
    SyncStatus,
};
use meshctl_common::protocol::ManagerMessage;
use tokio::sync::{
    mpsc,
    RwLock,
};
use tracing::{
    info,
    warn,
};

use crate::aggregator::Aggregator;

/// Bounded FIFO depth per session outbox. A single writer task drains it in
/// order; producers never block (`try_send`), surfacing `Backpressure`
/// instead, per spec.md §5.
pub const OUTBOX_CAPACITY: usize = 256;

/// One live bidirectional connection between one edge and the manager.
///
/// Owned exclusively by the [`ConnectionManager`]; fields other than the
/// outbox sender are mutated only by the session's own receive loop after
/// registration, per spec.md §5's ownership rule.
pub struct Session {
    pub cluster_id: ClusterId,
    pub capabilities: RwLock<EdgeCapabilities>,
    pub connected_at: DateTime<Utc>,
    pub last_update_at: RwLock<Option<DateTime<Utc>>>,
    pub remote_endpoint: String,
    pub outbox: mpsc::Sender<ManagerMessage>,
    snapshot_version: AtomicU64,
}

impl Session {
    pub fn new(
        cluster_id: ClusterId, capabilities: EdgeCapabilities, remote_endpoint: String,
        outbox: mpsc::Sender<ManagerMessage>,
    ) -> Self {
        Session {
            cluster_id,
            capabilities: RwLock::new(capabilities),
            connected_at: Utc::now(),
            last_update_at: RwLock::new(None),
            remote_endpoint,
            outbox,
            snapshot_version: AtomicU64::new(0),
        }
    }

    pub fn bump_snapshot_version(&self) -> u64 {
        self.snapshot_version.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Registry of active edge sessions and their per-session send queues.
///
/// Enforces "at most one live session per `clusterId`" (spec.md §4.2): a
/// second registration for an already-live cluster is rejected outright,
/// never hijacking the first session.
pub struct ConnectionManager {
    sessions: DashMap<ClusterId, Arc<Session>>,
    aggregator: Arc<Aggregator>,
}

impl ConnectionManager {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        ConnectionManager {
            sessions: DashMap::new(),
            aggregator,
        }
    }

    pub fn register_connection(&self, session: Arc<Session>) -> Result<(), Error> {
        let cluster_id = session.cluster_id.clone();
        match self.sessions.entry(cluster_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::AlreadyExists(format!(
                "cluster {cluster_id} already has a live session"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(session);
                info!(%cluster_id, "registered session");
                Ok(())
            }
        }
    }

    pub async fn update_capabilities(
        &self, cluster_id: &ClusterId, capabilities: EdgeCapabilities,
    ) -> Result<(), Error> {
        let session = self
            .sessions
            .get(cluster_id)
            .ok_or_else(|| Error::NotConnected(cluster_id.to_string()))?
            .clone();
        *session.capabilities.write().await = capabilities;
        Ok(())
    }

    pub async fn update_cluster_state(
        &self, cluster_id: &ClusterId, snapshot: meshctl_common::model::ClusterSnapshot,
    ) -> Result<(), Error> {
        let session = self
            .sessions
            .get(cluster_id)
            .ok_or_else(|| Error::NotConnected(cluster_id.to_string()))?
            .clone();
        self.aggregator.apply_snapshot(cluster_id.clone(), snapshot);
        session.bump_snapshot_version();
        *session.last_update_at.write().await = Some(Utc::now());
        Ok(())
    }

    pub fn send_message_to_cluster(
        &self, cluster_id: &ClusterId, envelope: ManagerMessage,
    ) -> Result<(), Error> {
        let session = self
            .sessions
            .get(cluster_id)
            .ok_or_else(|| Error::NotConnected(cluster_id.to_string()))?;
        match session.outbox.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(Error::Backpressure(cluster_id.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(Error::NotConnected(cluster_id.to_string()))
            }
        }
    }

    pub fn is_cluster_connected(&self, cluster_id: &ClusterId) -> bool {
        self.sessions.contains_key(cluster_id)
    }

    pub fn get_session(&self, cluster_id: &ClusterId) -> Option<Arc<Session>> {
        self.sessions.get(cluster_id).map(|s| s.clone())
    }

    pub async fn list_cluster_sync_info(&self, sync_interval: chrono::Duration) -> Vec<ClusterSyncInfo> {
        let now = Utc::now();
        let mut infos = Vec::with_capacity(self.sessions.len());
        for entry in self.sessions.iter() {
            let session = entry.value();
            let last_update_at = *session.last_update_at.read().await;
            let capabilities = *session.capabilities.read().await;
            let service_count = self
                .aggregator
                .service_count_for_cluster(&session.cluster_id);
            infos.push(ClusterSyncInfo {
                cluster_id: session.cluster_id.to_string(),
                connected_at: session.connected_at,
                last_update_at,
                service_count,
                sync_status: SyncStatus::derive(last_update_at, now, sync_interval),
                metrics_enabled: capabilities.metrics_enabled,
            });
        }
        infos
    }

    /// Releases the session. Returns the removed session, if any, so the
    /// caller (the session server) can notify the Correlator — disconnect
    /// cancellation is the Correlator's responsibility, not this registry's.
    pub fn unregister_connection(&self, cluster_id: &ClusterId) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(cluster_id).map(|(_, s)| s);
        if removed.is_some() {
            self.aggregator.remove_cluster(cluster_id);
            warn!(%cluster_id, "unregistered session");
        }
        removed
    }
}
