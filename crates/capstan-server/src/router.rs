use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use capstan_link::CallTransport;
use capstan_store::DurableStore;
use capstan_types::StatusRegistry;

use crate::handler;

/// Shared state behind every handler.
pub struct AppState {
    pub registry: StatusRegistry,
    pub store: Arc<dyn DurableStore>,
    pub transport: Arc<dyn CallTransport>,
    pub secret: String,
}

impl AppState {
    /// Constant-position secret check for query-gated endpoints.
    pub fn secret_matches(&self, provided: Option<&str>) -> bool {
        provided == Some(self.secret.as_str())
    }
}

/// Build the axum router with all Capstan endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handler::greeting_handler))
        .route("/status", get(handler::status_handler))
        .route("/record", get(handler::record_handler))
        .route("/upload", post(handler::upload_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
