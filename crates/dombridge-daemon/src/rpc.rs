//! JSON-RPC 2.0 request and response shapes for the control socket.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use dombridge_wire::Parameters;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get(name))
            .and_then(Value::as_str)
    }

    pub fn param_u64(&self, name: &str) -> Option<u64> {
        self.params
            .as_ref()
            .and_then(|p| p.get(name))
            .and_then(Value::as_u64)
    }

    /// The `parameters` object forwarded verbatim to the executor.
    pub fn command_parameters(&self) -> Parameters {
        self.params
            .as_ref()
            .and_then(|p| p.get("parameters"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn error_with_data(id: Value, code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: Some(data),
            }),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": null,
                "error": {"code": PARSE_ERROR, "message": "response serialization failed"}
            })
            .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_param_helpers() {
        let request: RpcRequest = serde_json::from_str(
            r##"{"jsonrpc":"2.0","id":1,"method":"click_element",
                "params":{"source":"tool","timeout_ms":5000,
                          "parameters":{"selector":"#go"}}}"##,
        )
        .unwrap();
        assert_eq!(request.method, "click_element");
        assert_eq!(request.param_str("source"), Some("tool"));
        assert_eq!(request.param_u64("timeout_ms"), Some(5000));
        assert_eq!(
            request.command_parameters().get("selector").and_then(Value::as_str),
            Some("#go")
        );
    }

    #[test]
    fn test_request_without_params() {
        let request: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#).unwrap();
        assert_eq!(request.param_str("source"), None);
        assert!(request.command_parameters().is_empty());
    }

    #[test]
    fn test_success_response_shape() {
        let response = RpcResponse::success(json!(7), json!({"ok": true}));
        let value: Value = serde_json::from_str(&response.to_json()).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["result"]["ok"], true);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_error_response_shape() {
        let response = RpcResponse::error(json!(8), -32001, "no executor connected");
        let value: Value = serde_json::from_str(&response.to_json()).unwrap();
        assert_eq!(value["error"]["code"], -32001);
        assert!(value.get("result").is_none());
    }
}
