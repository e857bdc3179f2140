use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::Value;

use crate::router::AppState;

/// How long an upload may wait on the storage network before the request
/// is failed. An unresolved link call would otherwise hang the request
/// forever.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Plain greeting.
pub async fn greeting_handler() -> &'static str {
    "Hi! This is the Capstan sync service."
}

/// Liveness text without the secret, the full aggregated report with it.
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !state.secret_matches(query.get("secret").map(String::as_str)) {
        return "I'm still alive".into_response();
    }
    Json(state.registry.report()).into_response()
}

/// Secret-gated single durable-record lookup (cursors, pending markers,
/// dead letters).
pub async fn record_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !state.secret_matches(query.get("secret").map(String::as_str)) {
        return (StatusCode::UNAUTHORIZED, "secret required").into_response();
    }
    let Some(key) = query.get("key") else {
        return (StatusCode::BAD_REQUEST, "missing key").into_response();
    };
    match state.store.get(key) {
        Ok(Some(value)) => Json(value).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no such record").into_response(),
        Err(e) => {
            tracing::error!(error = %e, key, "record lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "store error").into_response()
        }
    }
}

/// Secret-gated passthrough to the storage network's add capability.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !state.secret_matches(query.get("secret").map(String::as_str)) {
        return (StatusCode::UNAUTHORIZED, "secret required").into_response();
    }
    match tokio::time::timeout(UPLOAD_TIMEOUT, state.transport.call("ipfs_add", body)).await {
        Ok(Ok(result)) => Json(result).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "upload rejected by storage");
            (StatusCode::BAD_GATEWAY, "storage rejected the upload").into_response()
        }
        Err(_) => (StatusCode::GATEWAY_TIMEOUT, "storage did not answer").into_response(),
    }
}
