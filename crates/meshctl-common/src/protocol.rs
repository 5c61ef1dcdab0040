use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use tungstenite::Message;

use crate::error::Error;
use crate::ids::{
    ClusterId,
    RequestId,
};
use crate::model::{
    EdgeCapabilities,
    ClusterSnapshot,
    ProxyConfig,
    ServiceGraphFilters,
    ServiceGraphMetrics,
};

/// Edge→Manager variants, per spec.md §4.1.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EdgeMessage {
    ClusterIdentification {
        cluster_id: String,
        capabilities: EdgeCapabilities,
    },
    ClusterState {
        snapshot: ClusterSnapshot,
    },
    ProxyConfigResponse {
        request_id: RequestId,
        #[serde(flatten)]
        result: WireResult<ProxyConfig>,
    },
    ServiceGraphMetricsResponse {
        request_id: RequestId,
        #[serde(flatten)]
        result: WireResult<ServiceGraphMetrics>,
    },
}

/// Manager→Edge variants, per spec.md §4.1.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ManagerMessage {
    ConnectionAck {
        accepted: bool,
    },
    ProxyConfigRequest {
        request_id: RequestId,
        pod_namespace: String,
        pod_name: String,
    },
    ServiceGraphMetricsRequest {
        request_id: RequestId,
        filters: ServiceGraphFilters,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    Error {
        code: String,
        message: String,
    },
}

/// An in-band success-or-error payload, matching the teacher's
/// `{result|error_message}` response shape without inventing a new envelope
/// variant per outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WireResult<T> {
    Ok(T),
    Err(String),
}

impl<T> From<Result<T, String>> for WireResult<T> {
    fn from(r: Result<T, String>) -> Self {
        match r {
            Ok(v) => WireResult::Ok(v),
            Err(e) => WireResult::Err(e),
        }
    }
}

impl<T> From<WireResult<T>> for Result<T, String> {
    fn from(r: WireResult<T>) -> Self {
        match r {
            WireResult::Ok(v) => Ok(v),
            WireResult::Err(e) => Err(e),
        }
    }
}

/// Encodes/decodes envelopes onto a WebSocket binary frame, enforcing the
/// configured max frame size. WebSocket binary frames are already
/// length-delimited by the protocol, satisfying spec.md §6's transport
/// requirement without a bespoke codec.
pub struct Frame;

impl Frame {
    pub fn encode_edge(msg: &EdgeMessage, max_message_size: usize) -> Result<Message, Error> {
        let bytes =
            serde_json::to_vec(msg).map_err(|e| Error::Internal(format!("encode failed: {e}")))?;
        if bytes.len() > max_message_size {
            return Err(Error::InvalidArgument(format!(
                "message of {} bytes exceeds max_message_size {}",
                bytes.len(),
                max_message_size
            )));
        }
        Ok(Message::Binary(bytes.into()))
    }

    pub fn encode_manager(msg: &ManagerMessage, max_message_size: usize) -> Result<Message, Error> {
        let bytes =
            serde_json::to_vec(msg).map_err(|e| Error::Internal(format!("encode failed: {e}")))?;
        if bytes.len() > max_message_size {
            return Err(Error::InvalidArgument(format!(
                "message of {} bytes exceeds max_message_size {}",
                bytes.len(),
                max_message_size
            )));
        }
        Ok(Message::Binary(bytes.into()))
    }

    pub fn decode_edge(msg: &Message) -> Result<EdgeMessage, Error> {
        match msg {
            Message::Binary(data) => serde_json::from_slice(data)
                .map_err(|e| Error::InvalidArgument(format!("malformed edge message: {e}"))),
            other => Err(Error::InvalidArgument(format!(
                "unexpected frame type: {other:?}"
            ))),
        }
    }

    pub fn decode_manager(msg: &Message) -> Result<ManagerMessage, Error> {
        match msg {
            Message::Binary(data) => serde_json::from_slice(data)
                .map_err(|e| Error::InvalidArgument(format!("malformed manager message: {e}"))),
            other => Err(Error::InvalidArgument(format!(
                "unexpected frame type: {other:?}"
            ))),
        }
    }
}

impl EdgeMessage {
    pub fn cluster_id(raw: &str) -> Result<ClusterId, Error> {
        ClusterId::new(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EdgeCapabilities;

    #[test]
    fn edge_identification_round_trips() {
        let msg = EdgeMessage::ClusterIdentification {
            cluster_id: "prod-west".into(),
            capabilities: EdgeCapabilities {
                metrics_enabled: true,
            },
        };
        let frame = Frame::encode_edge(&msg, 4 * 1024 * 1024).unwrap();
        let decoded = Frame::decode_edge(&frame).unwrap();
        match decoded {
            EdgeMessage::ClusterIdentification {
                cluster_id,
                capabilities,
            } => {
                assert_eq!(cluster_id, "prod-west");
                assert!(capabilities.metrics_enabled);
            }
            _ => panic!("expected ClusterIdentification"),
        }
    }

    #[test]
    fn oversized_message_is_rejected() {
        let msg = ManagerMessage::ConnectionAck { accepted: true };
        let err = Frame::encode_manager(&msg, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn wire_result_round_trips_error() {
        let result: WireResult<ProxyConfig> = Err::<ProxyConfig, _>("boom".to_string()).into();
        let msg = EdgeMessage::ProxyConfigResponse {
            request_id: RequestId::new(),
            result,
        };
        let frame = Frame::encode_edge(&msg, 4 * 1024 * 1024).unwrap();
        let decoded = Frame::decode_edge(&frame).unwrap();
        match decoded {
            EdgeMessage::ProxyConfigResponse { result, .. } => {
                let r: Result<ProxyConfig, String> = result.into();
                assert_eq!(r.unwrap_err(), "boom");
            }
            _ => panic!("expected ProxyConfigResponse"),
        }
    }
}
