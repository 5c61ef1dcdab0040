use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};
use uuid::Uuid;

/// Opaque cluster identifier chosen by the edge at handshake time.
///
/// Non-empty by construction; uniqueness across live sessions is enforced by
/// the Connection Manager, not by this type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn new(raw: impl Into<String>) -> Result<Self, crate::error::Error> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(crate::error::Error::invalid_argument(
                "cluster id must not be empty",
            ));
        }
        Ok(ClusterId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ClusterId> for String {
    fn from(id: ClusterId) -> Self {
        id.0
    }
}

/// Random 128-bit request id, rendered as the canonical 36-char hyphenated
/// hex form. Opaque to the transport; used only for manager-side
/// request/response correlation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// `"<namespace>:<service-name>"`.
pub fn service_id(namespace: &str, name: &str) -> String {
    format!("{namespace}:{name}")
}

/// `"<cluster-name>:<namespace>:<pod-name>"`.
pub fn instance_id(cluster_name: &str, namespace: &str, pod_name: &str) -> String {
    format!("{cluster_name}:{namespace}:{pod_name}")
}

/// Splits a `service_id` into `(namespace, name)`.
pub fn parse_service_id(id: &str) -> Result<(&str, &str), crate::error::Error> {
    id.split_once(':')
        .filter(|(ns, name)| !ns.is_empty() && !name.is_empty())
        .ok_or_else(|| crate::error::Error::invalid_argument(format!("malformed service id: {id}")))
}

/// Splits an `instance_id` into `(cluster_name, namespace, pod_name)`.
pub fn parse_instance_id(id: &str) -> Result<(&str, &str, &str), crate::error::Error> {
    let mut parts = id.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(cluster), Some(ns), Some(pod))
            if !cluster.is_empty() && !ns.is_empty() && !pod.is_empty() =>
        {
            Ok((cluster, ns, pod))
        }
        _ => Err(crate::error::Error::invalid_argument(format!(
            "malformed instance id: {id}"
        ))),
    }
}
