//! Classification of raw inbound text frames and outbound control frames.

use serde::Serialize;

use crate::envelope::ResponseEnvelope;
use crate::error::WireError;

/// What the broker may send outside of command correlation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Greeting sent once per accepted peer connection.
    ConnectionEstablished { message: String },
    /// Reply to a peer heartbeat.
    HeartbeatResponse,
}

impl ControlFrame {
    pub fn greeting() -> Self {
        ControlFrame::ConnectionEstablished {
            message: "connected to dombridge broker".to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialize)
    }
}

/// A decoded inbound frame from the executor peer.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// A response correlating to a pending command.
    Response(ResponseEnvelope),
    /// Keepalive from the peer; answered below the router.
    Heartbeat,
    /// Valid JSON the broker does not recognize. Logged and dropped.
    Unknown(String),
}

impl InboundFrame {
    /// Classifies one text frame. A frame with `id` and `status` keys is a
    /// response; a `type: heartbeat` frame is a keepalive; anything else that
    /// parses as JSON is unknown. Invalid JSON is an error.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(WireError::MalformedFrame)?;

        if value.get("id").is_some() && value.get("status").is_some() {
            let response: ResponseEnvelope =
                serde_json::from_value(value).map_err(WireError::MalformedFrame)?;
            return Ok(InboundFrame::Response(response));
        }

        match value.get("type").and_then(|t| t.as_str()) {
            Some("heartbeat") => Ok(InboundFrame::Heartbeat),
            Some(other) => Ok(InboundFrame::Unknown(other.to_string())),
            None => Ok(InboundFrame::Unknown("untyped".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ResponseStatus;

    #[test]
    fn test_parse_response_frame() {
        let frame = InboundFrame::parse(r#"{"id":"r7","status":"ok","data":null}"#).unwrap();
        match frame {
            InboundFrame::Response(response) => {
                assert_eq!(response.id, "r7");
                assert_eq!(response.status, ResponseStatus::Ok);
            }
            other => panic!("expected response frame, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_heartbeat_frame() {
        let frame = InboundFrame::parse(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Heartbeat);
    }

    #[test]
    fn test_parse_unknown_typed_frame() {
        let frame = InboundFrame::parse(r#"{"type":"tab_updated","url":"x"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Unknown("tab_updated".to_string()));
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(InboundFrame::parse("{not json").is_err());
    }

    #[test]
    fn test_control_frame_serializes_with_type_tag() {
        let json = ControlFrame::HeartbeatResponse.to_json().unwrap();
        assert_eq!(json, r#"{"type":"heartbeat_response"}"#);

        let json = ControlFrame::greeting().to_json().unwrap();
        assert!(json.contains(r#""type":"connection_established""#));
    }
}
