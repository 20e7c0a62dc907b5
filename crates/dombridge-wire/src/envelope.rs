//! Command and response wire envelopes.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::action::ActionKind;
use crate::action::CallerKind;
use crate::error::WireError;

/// String-keyed scalar parameters attached to a command.
pub type Parameters = serde_json::Map<String, Value>;

/// A command sent from the broker to the executor peer. The `id` is unique
/// per connection epoch and is echoed back verbatim in the response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandEnvelope {
    pub id: String,
    pub action: ActionKind,
    #[serde(default)]
    pub parameters: Parameters,
    pub source: CallerKind,
}

impl CommandEnvelope {
    pub fn new(
        id: impl Into<String>,
        action: ActionKind,
        parameters: Parameters,
        source: CallerKind,
    ) -> Result<Self, WireError> {
        action.validate(&parameters)?;
        Ok(Self {
            id: id.into(),
            action,
            parameters,
            source,
        })
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Failure detail attached to an error response: a machine-readable kind tag
/// plus a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

/// A response from the executor peer correlating back to one command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    pub id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl ResponseEnvelope {
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            status: ResponseStatus::Ok,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ResponseStatus::Error,
            data: None,
            error: Some(ErrorDetail {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }

    /// Collapses the envelope into the outcome the router delivers: the data
    /// payload on success, or the peer's error detail on failure. Responses
    /// that violate the shape contract produce a synthesized detail rather
    /// than being dropped, so the awaiting caller still gets its one result.
    pub fn into_outcome(self) -> Result<Value, ErrorDetail> {
        match self.status {
            ResponseStatus::Ok => Ok(self.data.unwrap_or(Value::Null)),
            ResponseStatus::Error => Err(self.error.unwrap_or_else(|| ErrorDetail {
                kind: "unspecified".to_string(),
                message: "executor returned an error without detail".to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test params must be an object"),
        }
    }

    #[test]
    fn test_command_envelope_serializes_expected_shape() {
        let envelope = CommandEnvelope::new(
            "r1",
            ActionKind::ClickElement,
            params(json!({"selector": "#go"})),
            CallerKind::Interactive,
        )
        .unwrap();

        let value: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(value["id"], "r1");
        assert_eq!(value["action"], "click_element");
        assert_eq!(value["parameters"]["selector"], "#go");
        assert_eq!(value["source"], "interactive");
    }

    #[test]
    fn test_command_envelope_rejects_bad_params() {
        let err = CommandEnvelope::new(
            "r1",
            ActionKind::InputText,
            params(json!({"selector": "#name"})),
            CallerKind::Tool,
        )
        .unwrap_err();
        assert!(matches!(err, WireError::MissingParameter { name: "text", .. }));
    }

    #[test]
    fn test_response_ok_outcome_carries_data() {
        let json = r#"{"id":"r2","status":"ok","data":{"url":"https://example.com"}}"#;
        let response: ResponseEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(response.id, "r2");
        let data = response.into_outcome().unwrap();
        assert_eq!(data["url"], "https://example.com");
    }

    #[test]
    fn test_response_ok_without_data_yields_null() {
        let json = r#"{"id":"r2","status":"ok"}"#;
        let response: ResponseEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_outcome().unwrap(), Value::Null);
    }

    #[test]
    fn test_response_error_outcome_carries_detail() {
        let json = r#"{"id":"r3","status":"error","error":{"kind":"element_not_found","message":"no match for #go"}}"#;
        let response: ResponseEnvelope = serde_json::from_str(json).unwrap();
        let detail = response.into_outcome().unwrap_err();
        assert_eq!(detail.kind, "element_not_found");
        assert!(detail.message.contains("#go"));
    }

    #[test]
    fn test_response_error_without_detail_is_synthesized() {
        let response = ResponseEnvelope {
            id: "r4".to_string(),
            status: ResponseStatus::Error,
            data: None,
            error: None,
        };
        let detail = response.into_outcome().unwrap_err();
        assert_eq!(detail.kind, "unspecified");
    }
}
