use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshctl_common::config::ControlPlaneConfig;
use meshctl_common::error::Error;
use meshctl_common::ids::ClusterId;
use meshctl_common::model::{
    ClusterSnapshot,
    EdgeCapabilities,
    ProxyConfig,
};
use meshctl_edge::{
    BackoffPolicy,
    ClusterStateProvider,
    ProxyConfigFetcher,
    SessionClient,
    SessionClientConfig,
};
use tracing::info;

/// Placeholder `ClusterStateProvider` reporting an empty snapshot. The real
/// collector watches this cluster's Kubernetes/Istio APIs, an external
/// collaborator spec.md §1 leaves unspecified.
struct EmptyClusterStateProvider;

#[async_trait]
impl ClusterStateProvider for EmptyClusterStateProvider {
    async fn get_cluster_state(&self) -> Result<ClusterSnapshot, Error> {
        Ok(ClusterSnapshot::default())
    }
}

/// Placeholder `ProxyConfigFetcher` that always reports the pod as unknown.
/// A real implementation queries the pod's Envoy admin API.
struct UnimplementedProxyConfigFetcher;

#[async_trait]
impl ProxyConfigFetcher for UnimplementedProxyConfigFetcher {
    async fn get(&self, namespace: &str, pod: &str) -> Result<ProxyConfig, Error> {
        Err(Error::not_found(format!(
            "proxy config fetcher not configured for {namespace}/{pod}"
        )))
    }
}

fn load_cluster_id() -> Result<ClusterId, Error> {
    let raw = env::var("MESHCTL_CLUSTER_ID")
        .map_err(|_| Error::invalid_argument("MESHCTL_CLUSTER_ID not set"))?;
    ClusterId::new(raw)
}

fn load_manager_url() -> Result<String, Error> {
    env::var("MESHCTL_MANAGER_URL").map_err(|_| Error::invalid_argument("MESHCTL_MANAGER_URL not set"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ControlPlaneConfig::from_env()?;
    let cluster_id = load_cluster_id()?;
    let manager_url = load_manager_url()?;
    let metrics_enabled = config.metrics_provider.is_some();

    info!(%cluster_id, %manager_url, "starting mesh control plane edge agent");

    let client = SessionClient::new(
        SessionClientConfig {
            manager_url,
            cluster_id,
            capabilities: EdgeCapabilities { metrics_enabled },
            max_message_size: config.max_message_size,
            sync_interval: config.sync_interval.max(Duration::from_secs(1)),
            backoff: BackoffPolicy::DEFAULT,
        },
        Arc::new(EmptyClusterStateProvider),
        Arc::new(UnimplementedProxyConfigFetcher),
        None,
    );

    client.run().await?;
    Ok(())
}
