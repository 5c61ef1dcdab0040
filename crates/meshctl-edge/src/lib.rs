pub mod backoff;
pub mod handlers;
pub mod session_client;

pub use backoff::BackoffPolicy;
pub use handlers::{
    ClusterStateProvider,
    MetricsProvider,
    ProxyConfigFetcher,
};
pub use session_client::{
    SessionClient,
    SessionClientConfig,
};
