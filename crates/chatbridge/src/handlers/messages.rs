//! Outbound message HTTP handlers.

use std::future::Future;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::address::{Address, normalize};
use crate::broadcast::{BroadcastEntry, broadcast as run_broadcast};
use crate::dispatch::DispatchError;
use crate::group::GroupResolveError;
use crate::response;
use crate::server::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    to: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
pub struct SendResponse {
    status: &'static str,
    to: Address,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendGroupRequest {
    #[serde(default)]
    group_name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendGroupResponse {
    status: &'static str,
    group_id: Address,
    group_name: String,
}

#[derive(Deserialize)]
pub struct BroadcastRequest {
    #[serde(default)]
    numbers: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
pub struct BroadcastResponse {
    status: &'static str,
    results: Vec<BroadcastEntry>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /send
pub async fn send(
    State(state): State<AppState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return invalid_body(rejection),
    };

    let (Some(to), Some(message)) = (
        req.to.as_ref().and_then(recipient_text),
        non_empty(req.message),
    ) else {
        return response::bad_request("'to' and 'message' are required").into_response();
    };

    let target = match normalize(&to) {
        Ok(target) => target,
        Err(e) => return response::internal_error(e.to_string()).into_response(),
    };

    let dispatcher = state.dispatcher.clone();
    let sent = detached(async move { dispatcher.dispatch(&target, &message).await }).await;
    match sent {
        Err(failed) => failed,
        Ok(Ok(to)) => {
            info!(%to, "Sent message");
            (StatusCode::OK, Json(SendResponse { status: "ok", to })).into_response()
        }
        Ok(Err(e)) => dispatch_error(e),
    }
}

/// POST /sendGroupByName
pub async fn send_group_by_name(
    State(state): State<AppState>,
    body: Result<Json<SendGroupRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return invalid_body(rejection),
    };

    let (Some(group_name), Some(message)) = (non_empty(req.group_name), non_empty(req.message))
    else {
        return response::bad_request("'groupName' and 'message' are required").into_response();
    };

    let group = match state.groups.resolve(&group_name).await {
        Ok(group) => group,
        Err(GroupResolveError::NotFound { name }) => {
            return response::not_found(format!("Group '{name}' not found")).into_response();
        }
        Err(e) => return response::internal_error(e.to_string()).into_response(),
    };

    let dispatcher = state.dispatcher.clone();
    let address = group.address;
    let sent = detached(async move { dispatcher.dispatch(&address, &message).await }).await;
    match sent {
        Err(failed) => failed,
        Ok(Ok(group_id)) => {
            info!(%group_id, group_name = %group.name, "Sent group message");
            let body = SendGroupResponse {
                status: "ok",
                group_id,
                group_name: group.name,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(Err(e)) => dispatch_error(e),
    }
}

/// POST /broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return invalid_body(rejection),
    };

    let Some(Value::Array(numbers)) = req.numbers else {
        return response::bad_request("'numbers' must be an array").into_response();
    };
    let Some(message) = non_empty(req.message) else {
        return response::bad_request("'message' is required").into_response();
    };

    // Null and empty entries keep their JSON text and fail normalization in
    // their own entry.
    let targets: Vec<String> = numbers
        .iter()
        .map(|v| recipient_text(v).unwrap_or_else(|| v.to_string()))
        .collect();

    let dispatcher = state.dispatcher.clone();
    let results = match detached(async move {
        run_broadcast(&dispatcher, targets.as_slice(), &message).await
    })
    .await
    {
        Ok(results) => results,
        Err(failed) => return failed,
    };
    (
        StatusCode::OK,
        Json(BroadcastResponse {
            status: "ok",
            results,
        }),
    )
        .into_response()
}

// ============================================================================
// Helpers
// ============================================================================

/// Recipient as text: strings as is, anything else as its JSON text.
/// Null and the empty string count as absent.
fn recipient_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Run `work` on its own task. Dropping the request (timeout or client gone)
/// does not cancel a send that is already under way.
async fn detached<F>(work: F) -> Result<F::Output, Response>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(work).await.map_err(|e| {
        error!(error = %e, "Send task failed");
        response::internal_error("send task failed").into_response()
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn invalid_body(rejection: JsonRejection) -> Response {
    warn!(error = %rejection.body_text(), "Rejected request body");
    response::bad_request(format!("Invalid request body: {}", rejection.body_text())).into_response()
}

fn dispatch_error(err: DispatchError) -> Response {
    match err {
        DispatchError::EmptyBody => response::bad_request(err.to_string()).into_response(),
        err => response::internal_error(err.to_string()).into_response(),
    }
}
