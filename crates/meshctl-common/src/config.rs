use std::env;
use std::time::Duration;

use crate::error::Error;

/// Metrics backend selection, per spec.md §6.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricsProviderConfig {
    pub provider_type: String,
    pub endpoint: String,
    pub timeout: Duration,
}

/// Config shared by both the manager and the edge binaries: `port`,
/// `http_port`, `max_message_size`, `sync_interval`, `root_namespace`, and
/// metrics provider selection, per spec.md §6.
///
/// Loaded from the environment the way `kftray-server`'s `load_config()`
/// does — explicit `env::var` reads mapped to typed errors — generalized
/// into one reusable loader instead of being duplicated per binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlPlaneConfig {
    pub port: u16,
    pub http_port: u16,
    pub max_message_size: usize,
    pub sync_interval: Duration,
    pub root_namespace: String,
    pub metrics_provider: Option<MetricsProviderConfig>,
}

impl ControlPlaneConfig {
    pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
    pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
    pub const DEFAULT_ROOT_NAMESPACE: &'static str = "istio-system";

    pub fn from_env() -> Result<Self, Error> {
        let port = env_or("MESHCTL_PORT", "7443")?;
        let http_port = env_or("MESHCTL_HTTP_PORT", "8080")?;
        let max_message_size = env_or(
            "MESHCTL_MAX_MESSAGE_SIZE",
            &Self::DEFAULT_MAX_MESSAGE_SIZE.to_string(),
        )?;
        let sync_interval_secs: u64 = env_or(
            "MESHCTL_SYNC_INTERVAL_SECS",
            &Self::DEFAULT_SYNC_INTERVAL_SECS.to_string(),
        )?;
        let root_namespace =
            env::var("MESHCTL_ROOT_NAMESPACE").unwrap_or_else(|_| Self::DEFAULT_ROOT_NAMESPACE.to_string());

        let metrics_provider = match env::var("MESHCTL_METRICS_PROVIDER_TYPE") {
            Ok(provider_type) => {
                let endpoint = env::var("MESHCTL_METRICS_PROVIDER_ENDPOINT").map_err(|_| {
                    Error::invalid_argument(
                        "MESHCTL_METRICS_PROVIDER_ENDPOINT not set but provider type given",
                    )
                })?;
                let timeout_secs: u64 = env_or("MESHCTL_METRICS_PROVIDER_TIMEOUT_SECS", "5")?;
                Some(MetricsProviderConfig {
                    provider_type,
                    endpoint,
                    timeout: Duration::from_secs(timeout_secs),
                })
            }
            Err(_) => None,
        };

        Ok(ControlPlaneConfig {
            port,
            http_port,
            max_message_size,
            sync_interval: Duration::from_secs(sync_interval_secs),
            root_namespace,
            metrics_provider,
        })
    }
}

fn env_or<T>(key: &str, default: &str) -> Result<T, Error>
where
    T: std::str::FromStr,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid value for {key}")))
}
