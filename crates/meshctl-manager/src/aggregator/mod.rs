pub mod istio_match;

use dashmap::DashMap;
use meshctl_common::error::Error;
use meshctl_common::ids::{
    parse_instance_id,
    ClusterId,
};
use meshctl_common::model::{
    ClusterSnapshot,
    IstioResourceMeta,
    ProxyType,
    Service,
    WorkloadInstance,
};
use serde::Serialize;

/// Fleet-wide indexed view built from per-cluster snapshots pushed by C6.
///
/// Owns `ClusterSnapshot` records exclusively (spec.md §4.1's ownership
/// rule); the Connection Manager and Frontend only ever see copies returned
/// from its query surface.
pub struct Aggregator {
    snapshots: DashMap<ClusterId, ClusterSnapshot>,
}

/// One matched Istio resource kind's worth of applicable resources for a
/// single instance, keyed the way `IstioResources` groups its fields.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MatchedIstioResources {
    pub virtual_services: Vec<IstioResourceMeta>,
    pub destination_rules: Vec<IstioResourceMeta>,
    pub gateways: Vec<IstioResourceMeta>,
    pub sidecars: Vec<IstioResourceMeta>,
    pub envoy_filters: Vec<IstioResourceMeta>,
    pub request_authentications: Vec<IstioResourceMeta>,
    pub peer_authentications: Vec<IstioResourceMeta>,
    pub authorization_policies: Vec<IstioResourceMeta>,
    pub wasm_plugins: Vec<IstioResourceMeta>,
    pub service_entries: Vec<IstioResourceMeta>,
}

impl Aggregator {
    pub fn new() -> Self {
        Aggregator {
            snapshots: DashMap::new(),
        }
    }

    /// Atomically replaces the prior snapshot for `cluster_id`. Last-writer
    /// wins; the caller (the session's receive loop) is the only writer for
    /// a given cluster, so no extra locking is needed across snapshots.
    pub fn apply_snapshot(&self, cluster_id: ClusterId, snapshot: ClusterSnapshot) {
        self.snapshots.insert(cluster_id, snapshot);
    }

    pub fn remove_cluster(&self, cluster_id: &ClusterId) {
        self.snapshots.remove(cluster_id);
    }

    pub fn get_snapshot(&self, cluster_id: &ClusterId) -> Option<ClusterSnapshot> {
        self.snapshots.get(cluster_id).map(|s| s.clone())
    }

    pub fn service_count_for_cluster(&self, cluster_id: &ClusterId) -> usize {
        self.snapshots
            .get(cluster_id)
            .map(|s| s.services.len())
            .unwrap_or(0)
    }

    /// Aggregates services across all clusters matching the given filters.
    /// Two services merge iff `(namespace, name)` match; the merged
    /// `proxy_mode` follows the precedence in spec.md §4.3. Instances are
    /// ordered by `instance_id`, services by `(namespace, name)`.
    pub fn list_services(&self, namespace_filter: Option<&str>, cluster_id_filter: Option<&ClusterId>) -> Vec<Service> {
        let mut merged: std::collections::BTreeMap<(String, String), Vec<WorkloadInstance>> =
            std::collections::BTreeMap::new();
        let mut cluster_ips: std::collections::HashMap<(String, String), std::collections::HashMap<String, String>> =
            std::collections::HashMap::new();
        let mut external_ips: std::collections::HashMap<(String, String), std::collections::HashMap<String, String>> =
            std::collections::HashMap::new();

        for entry in self.snapshots.iter() {
            let cluster_id = entry.key();
            if let Some(filter) = cluster_id_filter {
                if cluster_id != filter {
                    continue;
                }
            }
            for service in &entry.value().services {
                if let Some(ns) = namespace_filter {
                    if service.namespace != ns {
                        continue;
                    }
                }
                let key = (service.namespace.clone(), service.name.clone());
                merged.entry(key.clone()).or_default().extend(service.instances.iter().cloned());
                cluster_ips
                    .entry(key.clone())
                    .or_default()
                    .extend(service.cluster_ips.clone());
                external_ips
                    .entry(key)
                    .or_default()
                    .extend(service.external_ips.clone());
            }
        }

        merged
            .into_iter()
            .map(|((namespace, name), mut instances)| {
                instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
                let proxy_mode = ProxyType::merge(instances.iter().map(|i| i.proxy_type));
                let key = (namespace.clone(), name.clone());
                Service {
                    name,
                    namespace,
                    cluster_ips: cluster_ips.remove(&key).unwrap_or_default(),
                    external_ips: external_ips.remove(&key).unwrap_or_default(),
                    proxy_mode,
                    instances,
                }
            })
            .collect()
    }

    pub fn get_service_by_id(&self, id: &str) -> Result<Service, Error> {
        let (namespace, name) = meshctl_common::ids::parse_service_id(id)?;
        self.list_services(Some(namespace), None)
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::not_found(format!("service {id}")))
    }

    pub fn get_service_instance(&self, service_id: &str, instance_id: &str) -> Result<WorkloadInstance, Error> {
        let service = self.get_service_by_id(service_id)?;
        service
            .instances
            .into_iter()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| Error::not_found(format!("instance {instance_id}")))
    }

    /// Applies §4.3.1 matching against the instance's owning cluster
    /// snapshot — an instance is only ever matched against its own
    /// cluster's Istio resources, never cross-cluster.
    pub fn get_istio_resources_for_instance(
        &self, service_id: &str, instance_id: &str,
    ) -> Result<MatchedIstioResources, Error> {
        let instance = self.get_service_instance(service_id, instance_id)?;
        let (_, service_name) = meshctl_common::ids::parse_service_id(service_id)?;
        let (cluster_name, _, _) = parse_instance_id(instance_id)?;
        let cluster_id = ClusterId::new(cluster_name)?;
        let snapshot = self
            .get_snapshot(&cluster_id)
            .ok_or_else(|| Error::not_found(format!("cluster {cluster_name}")))?;
        let root_namespace = snapshot.root_namespace().to_string();
        let ns = instance.namespace.as_str();
        let labels = &instance.labels;
        // What a `targetRef` could plausibly name this workload by: the
        // Service it belongs to, or the pod itself.
        let candidates = [("Service", service_name), ("Pod", instance.pod_name.as_str())];

        let mut matched = MatchedIstioResources::default();

        matched.peer_authentications = snapshot
            .istio
            .peer_authentications
            .iter()
            .filter(|r| istio_match::peer_authentication_applies(&r.meta, &root_namespace, ns, labels))
            .map(|r| r.meta.clone())
            .collect();

        macro_rules! match_generic {
            ($field:ident) => {
                matched.$field = snapshot
                    .istio
                    .$field
                    .iter()
                    .filter(|r| istio_match::resource_applies(&r.meta, ns, labels, &candidates))
                    .map(|r| r.meta.clone())
                    .collect();
            };
        }

        match_generic!(virtual_services);
        match_generic!(destination_rules);
        match_generic!(gateways);
        match_generic!(sidecars);
        match_generic!(envoy_filters);
        match_generic!(request_authentications);
        match_generic!(authorization_policies);
        match_generic!(wasm_plugins);
        match_generic!(service_entries);

        Ok(matched)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
