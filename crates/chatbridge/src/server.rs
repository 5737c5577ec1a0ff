use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;

use crate::dispatch::Dispatcher;
use crate::group::GroupResolver;
use crate::handlers;
use crate::session::SessionHandle;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub groups: Arc<GroupResolver>,
    pub session: SessionHandle,
}

/// Build the router. The request timeout covers the read-only routes only:
/// message routes always run to completion and report every recipient.
pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let info_routes = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ));

    Router::new()
        .route("/send", post(handlers::send))
        .route("/sendGroupByName", post(handlers::send_group_by_name))
        .route("/broadcast", post(handlers::broadcast))
        .merge(info_routes)
        .with_state(state)
}
