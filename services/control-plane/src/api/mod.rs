//! HTTP API handlers and routing.

mod connect;
mod domains;
mod health;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .merge(health::routes())
        // Domain channel and introspection
        .nest("/v1/domains", connect::routes().merge(domains::routes()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
