use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, providers, resources, storage};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Storage root
        .route("/storage", get(storage::get_storage))
        .route("/storage/free", post(storage::free_space))
        .route("/storage/expire", post(storage::expire))
        .route("/storage/purge", post(storage::purge))
        // Provider admission counters (key is the percent-encoded provider key)
        .route("/providers/{key}", get(providers::get_provider))
        .route("/providers/{key}", delete(providers::reset_provider))
        // Resources
        .route("/resources/{id}/download", post(resources::download))
        .route("/resources/{id}", delete(resources::remove));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
