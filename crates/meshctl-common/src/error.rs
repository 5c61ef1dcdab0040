use thiserror::Error;

/// Transport-neutral error taxonomy shared by the manager and the edge.
///
/// Every variant here corresponds to an entry in the control plane's error
/// taxonomy: malformed input, absent resources, connection-state conflicts,
/// and the on-demand request lifecycle (backpressure, timeout, disconnect).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("backpressure: outbox full for cluster {0}")]
    Backpressure(String),

    #[error("timeout waiting for reply")]
    Timeout,

    #[error("cluster disconnected: {0}")]
    ClusterDisconnected(String),

    #[error("edge error: {0}")]
    EdgeError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
