use std::sync::Arc;
use std::time::Duration;

use chrono::{
    DateTime,
    Utc,
};
use futures::future::join_all;
use meshctl_common::error::Error;
use meshctl_common::ids::{
    parse_instance_id,
    ClusterId,
};
use meshctl_common::model::{
    ClusterSyncInfo,
    ProxyConfig,
    Service,
    ServiceConnectionPair,
    ServiceGraphFilters,
    WorkloadInstance,
};
use meshctl_common::validate::validate_time_range;

use crate::aggregator::{
    Aggregator,
    MatchedIstioResources,
};
use crate::connection::ConnectionManager;
use crate::correlator::{
    self,
    Correlator,
};

/// Result of a `GetServiceConnections` fan-out, per spec.md §4.8.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ServiceConnections {
    pub inbound: Vec<ServiceConnectionPair>,
    pub outbound: Vec<ServiceConnectionPair>,
    pub timestamp: DateTime<Utc>,
    pub clusters_queried: Vec<String>,
}

/// Stateless facade over the Connection Manager, State Aggregator and
/// Correlator. Holds no state of its own beyond the three shared handles.
pub struct FrontendApi {
    connections: Arc<ConnectionManager>,
    aggregator: Arc<Aggregator>,
    correlator: Arc<Correlator>,
    sync_interval: chrono::Duration,
}

impl FrontendApi {
    pub fn new(
        connections: Arc<ConnectionManager>, aggregator: Arc<Aggregator>, correlator: Arc<Correlator>,
        sync_interval: chrono::Duration,
    ) -> Self {
        FrontendApi {
            connections,
            aggregator,
            correlator,
            sync_interval,
        }
    }

    pub fn list_services(&self, namespace: Option<&str>, cluster_id: Option<&ClusterId>) -> Vec<Service> {
        self.aggregator.list_services(namespace, cluster_id)
    }

    pub fn get_service(&self, id: &str) -> Result<Service, Error> {
        self.aggregator.get_service_by_id(id)
    }

    pub fn get_service_instance(&self, service_id: &str, instance_id: &str) -> Result<WorkloadInstance, Error> {
        self.aggregator.get_service_instance(service_id, instance_id)
    }

    pub fn get_istio_resources(
        &self, service_id: &str, instance_id: &str,
    ) -> Result<MatchedIstioResources, Error> {
        self.aggregator.get_istio_resources_for_instance(service_id, instance_id)
    }

    pub async fn list_clusters(&self) -> Vec<ClusterSyncInfo> {
        self.connections.list_cluster_sync_info(self.sync_interval).await
    }

    /// Extracts the owning cluster from `instance_id`'s first segment and
    /// issues a `ProxyConfig` request through the Correlator with the
    /// default 60s deadline.
    pub async fn get_proxy_config(&self, service_id: &str, instance_id: &str) -> Result<ProxyConfig, Error> {
        let instance = self.aggregator.get_service_instance(service_id, instance_id)?;
        let (cluster_name, _, _) = parse_instance_id(instance_id)?;
        let cluster_id = ClusterId::new(cluster_name)?;

        correlator::issue_proxy_config_request(
            &self.correlator,
            &self.connections,
            &cluster_id,
            instance.namespace,
            instance.pod_name,
            correlator::DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Fans out a metrics request to every metrics-capable connected
    /// cluster in parallel, merges the per-cluster results, and filters
    /// pairs down to those touching `(service, namespace)` after the
    /// fan-out, per spec.md §4.8.
    pub async fn get_service_connections(
        &self, service: &str, namespace: &str, start_time: DateTime<Utc>, end_time: DateTime<Utc>,
    ) -> Result<ServiceConnections, Error> {
        validate_time_range(start_time, end_time, Utc::now())?;

        let clusters = self.connections.list_cluster_sync_info(self.sync_interval).await;
        let metrics_capable: Vec<ClusterId> = clusters
            .into_iter()
            .filter(|c| c.metrics_enabled)
            .filter_map(|c| ClusterId::new(c.cluster_id).ok())
            .collect();

        let filters = ServiceGraphFilters {
            service: service.to_string(),
            namespace: namespace.to_string(),
        };

        let futures = metrics_capable.iter().map(|cluster_id| {
            let filters = filters.clone();
            async move {
                let result = correlator::issue_service_graph_metrics_request(
                    &self.correlator,
                    &self.connections,
                    cluster_id,
                    filters,
                    start_time,
                    end_time,
                    Duration::from_secs(60),
                )
                .await;
                (cluster_id.clone(), result)
            }
        });

        let mut clusters_queried = Vec::new();
        let mut inbound = Vec::new();
        let mut outbound = Vec::new();

        for (cluster_id, result) in join_all(futures).await {
            match result {
                Ok(metrics) => {
                    clusters_queried.push(cluster_id.to_string());
                    for pair in metrics.pairs {
                        if pair.destination_service == service && pair.destination_namespace == namespace {
                            inbound.push(pair.clone());
                        }
                        if pair.source_service == service && pair.source_namespace == namespace {
                            outbound.push(pair);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(%cluster_id, error = %e, "service graph metrics request failed");
                }
            }
        }

        Ok(ServiceConnections {
            inbound,
            outbound,
            timestamp: Utc::now(),
            clusters_queried,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_proxy_config_rejects_unknown_instance() {
        let aggregator = Arc::new(Aggregator::new());
        let connections = Arc::new(ConnectionManager::new(aggregator.clone()));
        let correlator = Arc::new(Correlator::new());
        let api = FrontendApi::new(connections, aggregator, correlator, chrono::Duration::seconds(30));

        let err = api
            .get_proxy_config("default:nginx", "prod-west:default:nginx-1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn get_service_connections_rejects_inverted_range() {
        let aggregator = Arc::new(Aggregator::new());
        let connections = Arc::new(ConnectionManager::new(aggregator.clone()));
        let correlator = Arc::new(Correlator::new());
        let api = FrontendApi::new(connections, aggregator, correlator, chrono::Duration::seconds(30));

        let now = Utc::now();
        let err = api
            .get_service_connections("nginx", "default", now, now - chrono::Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
