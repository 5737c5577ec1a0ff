use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::server::AppState;
use crate::session::SessionStatus;

const CAPABILITIES: &str = "\
chatbridge gateway

GET  /                 this summary
GET  /health           liveness
GET  /status           session state
POST /send             {\"to\": \"628123456789\", \"message\": \"...\"}
POST /sendGroupByName  {\"groupName\": \"...\", \"message\": \"...\"}
POST /broadcast        {\"numbers\": [\"628...\", ...], \"message\": \"...\"}
";

/// GET /
pub async fn index() -> (StatusCode, &'static str) {
    (StatusCode::OK, CAPABILITIES)
}

/// GET /health
pub async fn health() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> (StatusCode, Json<SessionStatus>) {
    (StatusCode::OK, Json(state.session.status()))
}
