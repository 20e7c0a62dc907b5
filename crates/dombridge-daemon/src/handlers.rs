//! Method dispatch for the control socket.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde_json::Value;
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use dombridge_common::error_codes;
use dombridge_router::ConnectionState;
use dombridge_router::Router;
use dombridge_router::SubmitError;
use dombridge_wire::CallerKind;

use crate::rpc::INVALID_REQUEST;
use crate::rpc::RpcRequest;
use crate::rpc::RpcResponse;
use crate::store::SelectorRecord;
use crate::store::SelectorStore;

/// Shared state behind every control connection.
pub struct Ctx {
    pub router: Arc<Router>,
    pub store: Arc<SelectorStore>,
    pub started_at: Instant,
    pub shutdown: watch::Sender<bool>,
}

/// Routes one request. Reserved method names are served locally; anything
/// else is treated as an executor action and submitted to the router.
pub async fn handle(ctx: &Ctx, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    match request.method.as_str() {
        "ping" => RpcResponse::success(id, json!("pong")),
        "status" => RpcResponse::success(id, status_payload(ctx)),
        "shutdown" => {
            info!("shutdown requested over control socket");
            let _ = ctx.shutdown.send(true);
            RpcResponse::success(id, json!("ok"))
        }
        "selectors_list" | "list_saved_selectors" => {
            RpcResponse::success(id, json!({"selectors": ctx.store.list()}))
        }
        "selectors_save" => selectors_save(ctx, &request),
        "selectors_delete" => selectors_delete(ctx, &request),
        _ => execute(ctx, &request).await,
    }
}

fn status_payload(ctx: &Ctx) -> Value {
    let status = ctx.router.status();
    let state = match status.state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Backoff => "backoff",
    };
    json!({
        "connection": state,
        "epoch": status.epoch,
        "pending": ctx.router.pending_count(),
        "uptime_ms": ctx.started_at.elapsed().as_millis() as u64,
    })
}

fn selectors_save(ctx: &Ctx, request: &RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let (name, selector, action) = match (
        request.param_str("name"),
        request.param_str("selector"),
        request.param_str("action"),
    ) {
        (Some(name), Some(selector), Some(action)) => (name, selector, action),
        _ => {
            return RpcResponse::error(
                id,
                error_codes::INVALID_PARAMETERS,
                "selectors_save requires name, selector and action",
            );
        }
    };
    let record = SelectorRecord {
        name: name.to_string(),
        selector: selector.to_string(),
        action: action.to_string(),
        text: request.param_str("text").map(str::to_string),
        key: request.param_str("key").map(str::to_string),
        description: request.param_str("description").map(str::to_string),
    };
    match ctx.store.save(record) {
        Ok(()) => RpcResponse::success(id, json!("ok")),
        Err(err) => RpcResponse::error(id, error_codes::STORE_ERROR, err.to_string()),
    }
}

fn selectors_delete(ctx: &Ctx, request: &RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let Some(name) = request.param_str("name") else {
        return RpcResponse::error(
            id,
            error_codes::INVALID_PARAMETERS,
            "selectors_delete requires name",
        );
    };
    match ctx.store.delete(name) {
        Ok(()) => RpcResponse::success(id, json!("ok")),
        Err(err) => RpcResponse::error(id, error_codes::STORE_ERROR, err.to_string()),
    }
}

async fn execute(ctx: &Ctx, request: &RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.method.is_empty() {
        return RpcResponse::error(id, INVALID_REQUEST, "missing method");
    }
    let source = request
        .param_str("source")
        .and_then(CallerKind::parse)
        .unwrap_or_default();
    let timeout = request.param_u64("timeout_ms").map(Duration::from_millis);
    let parameters = request.command_parameters();

    match ctx
        .router
        .submit(&request.method, parameters, source, timeout)
        .await
    {
        Ok(data) => RpcResponse::success(id, data),
        Err(err) => {
            let code = submit_error_code(&err);
            RpcResponse::error_with_data(id, code, err.to_string(), json!({"kind": err.kind()}))
        }
    }
}

fn submit_error_code(err: &SubmitError) -> i32 {
    match err {
        SubmitError::Unavailable => error_codes::UNAVAILABLE,
        SubmitError::Timeout { .. } => error_codes::REQUEST_TIMEOUT,
        SubmitError::ConnectionLost => error_codes::CONNECTION_LOST,
        SubmitError::Executor { .. } => error_codes::EXECUTOR_ERROR,
        SubmitError::UnsupportedAction(_) => error_codes::UNSUPPORTED_ACTION,
        SubmitError::InvalidParameters(_) => error_codes::INVALID_PARAMETERS,
        SubmitError::Internal(_) => error_codes::GENERIC_ERROR,
    }
}
