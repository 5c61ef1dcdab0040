use std::collections::HashMap;

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Capabilities an edge advertises at handshake; immutable for the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeCapabilities {
    pub metrics_enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyType {
    None,
    Sidecar,
    Gateway,
    Router,
}

impl ProxyType {
    /// `ROUTER` if any instance is `ROUTER`, else `GATEWAY`, else `SIDECAR`,
    /// else `NONE` — the merge rule for a service aggregated across clusters.
    pub fn merge(modes: impl IntoIterator<Item = ProxyType>) -> ProxyType {
        let mut best = ProxyType::None;
        for mode in modes {
            best = match (best, mode) {
                (_, ProxyType::Router) | (ProxyType::Router, _) => ProxyType::Router,
                (_, ProxyType::Gateway) | (ProxyType::Gateway, _) => ProxyType::Gateway,
                (_, ProxyType::Sidecar) | (ProxyType::Sidecar, _) => ProxyType::Sidecar,
                _ => ProxyType::None,
            };
        }
        best
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap(pub HashMap<String, String>);

impl LabelMap {
    /// `self` (the selector) is a subset of `other` (the workload's labels).
    /// An empty selector matches everything.
    pub fn is_subset_of(&self, other: &LabelMap) -> bool {
        self.0
            .iter()
            .all(|(k, v)| other.0.get(k).is_some_and(|ov| ov == v))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkloadInstance {
    pub instance_id: String,
    pub ip: String,
    pub pod_name: String,
    pub namespace: String,
    pub cluster_name: String,
    pub proxy_type: ProxyType,
    pub labels: LabelMap,
    pub annotations: HashMap<String, String>,
    pub containers: Vec<String>,
    pub pod_status: String,
    pub node_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub namespace: String,
    pub cluster_ips: HashMap<String, String>,
    pub external_ips: HashMap<String, String>,
    pub proxy_mode: ProxyType,
    pub instances: Vec<WorkloadInstance>,
}

impl Service {
    pub fn id(&self) -> String {
        crate::ids::service_id(&self.namespace, &self.name)
    }
}

/// Shared fields every Istio resource kind carries, per spec.md §3.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IstioResourceMeta {
    pub name: String,
    pub namespace: String,
    pub workload_selector: Option<LabelMap>,
    pub target_refs: Vec<TargetRef>,
    pub export_to: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: String,
    pub name: String,
}

macro_rules! istio_resource {
    ($name:ident) => {
        #[derive(Clone, Debug, Serialize, Deserialize)]
        pub struct $name {
            #[serde(flatten)]
            pub meta: IstioResourceMeta,
        }
    };
}

istio_resource!(VirtualService);
istio_resource!(DestinationRule);
istio_resource!(Gateway);
istio_resource!(Sidecar);
istio_resource!(EnvoyFilter);
istio_resource!(RequestAuthentication);
istio_resource!(PeerAuthentication);
istio_resource!(AuthorizationPolicy);
istio_resource!(WasmPlugin);
istio_resource!(ServiceEntry);

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IstioResources {
    pub virtual_services: Vec<VirtualService>,
    pub destination_rules: Vec<DestinationRule>,
    pub gateways: Vec<Gateway>,
    pub sidecars: Vec<Sidecar>,
    pub envoy_filters: Vec<EnvoyFilter>,
    pub request_authentications: Vec<RequestAuthentication>,
    pub peer_authentications: Vec<PeerAuthentication>,
    pub authorization_policies: Vec<AuthorizationPolicy>,
    pub wasm_plugins: Vec<WasmPlugin>,
    pub service_entries: Vec<ServiceEntry>,
}

/// A point-in-time view of one cluster's services, instances and Istio
/// resources, as pushed by an edge's sync loop.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub services: Vec<Service>,
    pub istio: IstioResources,
    /// The Istio control namespace for this cluster; defaults to
    /// `istio-system` when the edge doesn't override it.
    pub root_namespace: Option<String>,
}

impl ClusterSnapshot {
    pub fn root_namespace(&self) -> &str {
        self.root_namespace.as_deref().unwrap_or("istio-system")
    }
}

/// Derived from `now - last_update_at` and connectivity, per spec.md §3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Initializing,
    Healthy,
    Stale,
    Disconnected,
}

impl SyncStatus {
    /// Pure function of `last_update_at`, `sync_interval` and `now`, per the
    /// thresholds pinned in spec.md §9 (`HEALTHY` within `2 * sync_interval`).
    pub fn derive(
        last_update_at: Option<DateTime<Utc>>, now: DateTime<Utc>,
        sync_interval: chrono::Duration,
    ) -> SyncStatus {
        match last_update_at {
            None => SyncStatus::Initializing,
            Some(last) => {
                let elapsed = now - last;
                if elapsed <= sync_interval * 2 {
                    SyncStatus::Healthy
                } else {
                    SyncStatus::Stale
                }
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterSyncInfo {
    pub cluster_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub service_count: usize,
    pub sync_status: SyncStatus,
    pub metrics_enabled: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConnectionPair {
    pub source_service: String,
    pub source_namespace: String,
    pub destination_service: String,
    pub destination_namespace: String,
    pub request_rate: f64,
    pub error_rate: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceGraphMetrics {
    pub pairs: Vec<ServiceConnectionPair>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceGraphFilters {
    pub service: String,
    pub namespace: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub raw_config: String,
}
