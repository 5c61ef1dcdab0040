use async_trait::async_trait;
use chrono::{
    DateTime,
    Utc,
};
use meshctl_common::error::Error;
use meshctl_common::ids::RequestId;
use meshctl_common::model::{
    ClusterSnapshot,
    ProxyConfig,
    ServiceGraphFilters,
    ServiceGraphMetrics,
};
use meshctl_common::protocol::EdgeMessage;
use meshctl_common::validate::validate_request_order;

/// Collects this cluster's current `ClusterSnapshot`, consulting an optional
/// metrics provider for anything it wants to fold in. Implemented against
/// the cluster's Kubernetes/Istio APIs outside this crate's scope (§1
/// Non-goals: no external collaborator implementation is specified).
#[async_trait]
pub trait ClusterStateProvider: Send + Sync {
    async fn get_cluster_state(&self) -> Result<ClusterSnapshot, Error>;
}

/// Resolves a running pod's Envoy proxy bootstrap/config dump.
#[async_trait]
pub trait ProxyConfigFetcher: Send + Sync {
    async fn get(&self, namespace: &str, pod: &str) -> Result<ProxyConfig, Error>;
}

/// Queries this cluster's metrics backend for the service connection graph.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn get_service_graph_metrics(
        &self, filters: &ServiceGraphFilters, start_time: DateTime<Utc>, end_time: DateTime<Utc>,
    ) -> Result<ServiceGraphMetrics, Error>;
}

/// Answers a `ProxyConfigRequest`. Handler errors are always reported
/// in-band as `error_message` — they never terminate the session, per
/// spec.md §4.7.
pub async fn handle_proxy_config_request(
    fetcher: &dyn ProxyConfigFetcher, request_id: RequestId, pod_namespace: &str, pod_name: &str,
) -> EdgeMessage {
    let result = fetcher
        .get(pod_namespace, pod_name)
        .await
        .map_err(|e| e.to_string());
    EdgeMessage::ProxyConfigResponse {
        request_id,
        result: result.into(),
    }
}

/// Answers a `ServiceGraphMetricsRequest`: validates the time range, then
/// delegates to the configured metrics provider. If none is configured, the
/// response carries the fixed error message from spec.md §4.7 instead of
/// failing the request outright. Only `end_time > start_time` is checked
/// here — unlike the frontend's `GetServiceConnections` (C8), this handler
/// must not also reject against its own clock, since the manager and the
/// edge are different processes and a "not in the future" check would be
/// comparing against the wrong clock under any skew between them.
pub async fn handle_service_graph_metrics_request(
    metrics_provider: Option<&dyn MetricsProvider>, request_id: RequestId, filters: ServiceGraphFilters,
    start_time: DateTime<Utc>, end_time: DateTime<Utc>,
) -> EdgeMessage {
    let result: Result<ServiceGraphMetrics, String> = async {
        validate_request_order(start_time, end_time).map_err(|e| e.to_string())?;
        let provider = metrics_provider.ok_or_else(|| "metrics provider not available".to_string())?;
        provider
            .get_service_graph_metrics(&filters, start_time, end_time)
            .await
            .map_err(|e| e.to_string())
    }
    .await;

    EdgeMessage::ServiceGraphMetricsResponse {
        request_id,
        result: result.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProxyConfigFetcher {
        response: Result<ProxyConfig, Error>,
    }

    #[async_trait]
    impl ProxyConfigFetcher for FakeProxyConfigFetcher {
        async fn get(&self, _namespace: &str, _pod: &str) -> Result<ProxyConfig, Error> {
            self.response.clone()
        }
    }

    struct FakeMetricsProvider {
        response: Result<ServiceGraphMetrics, Error>,
    }

    #[async_trait]
    impl MetricsProvider for FakeMetricsProvider {
        async fn get_service_graph_metrics(
            &self, _filters: &ServiceGraphFilters, _start_time: DateTime<Utc>, _end_time: DateTime<Utc>,
        ) -> Result<ServiceGraphMetrics, Error> {
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn proxy_config_errors_are_reported_in_band() {
        let fetcher = FakeProxyConfigFetcher {
            response: Err(Error::not_found("pod gone")),
        };
        let request_id = RequestId::new();
        let response = handle_proxy_config_request(&fetcher, request_id, "default", "nginx-1").await;
        match response {
            EdgeMessage::ProxyConfigResponse { result, .. } => {
                let r: Result<ProxyConfig, String> = result.into();
                assert!(r.unwrap_err().contains("pod gone"));
            }
            _ => panic!("expected ProxyConfigResponse"),
        }
    }

    #[tokio::test]
    async fn metrics_request_without_provider_reports_fixed_message() {
        let request_id = RequestId::new();
        let now = Utc::now();
        let response = handle_service_graph_metrics_request(
            None,
            request_id,
            ServiceGraphFilters {
                service: "nginx".into(),
                namespace: "default".into(),
            },
            now - chrono::Duration::hours(1),
            now,
        )
        .await;
        match response {
            EdgeMessage::ServiceGraphMetricsResponse { result, .. } => {
                let r: Result<ServiceGraphMetrics, String> = result.into();
                assert_eq!(r.unwrap_err(), "metrics provider not available");
            }
            _ => panic!("expected ServiceGraphMetricsResponse"),
        }
    }

    #[tokio::test]
    async fn metrics_request_rejects_inverted_time_range() {
        let provider = FakeMetricsProvider {
            response: Ok(ServiceGraphMetrics::default()),
        };
        let request_id = RequestId::new();
        let now = Utc::now();
        let response = handle_service_graph_metrics_request(
            Some(&provider),
            request_id,
            ServiceGraphFilters {
                service: "nginx".into(),
                namespace: "default".into(),
            },
            now,
            now - chrono::Duration::hours(1),
        )
        .await;
        match response {
            EdgeMessage::ServiceGraphMetricsResponse { result, .. } => {
                let r: Result<ServiceGraphMetrics, String> = result.into();
                assert!(r.is_err());
            }
            _ => panic!("expected ServiceGraphMetricsResponse"),
        }
    }
}
