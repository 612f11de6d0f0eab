// Axum web server layer

use axum::{
    error_handling::HandleErrorLayer,
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use crate::config::Config;
use crate::core::health::HealthReporter;
use crate::core::metrics::Metrics;
use crate::state::cache_aside::CacheAsideStore;

/// Application state containing all shared dependencies
///
/// Built once in `main`; handlers only ever see these shared handles.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CacheAsideStore>,
    pub health: Arc<HealthReporter>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}

/// Create the Axum router with all routes and middleware
///
/// Middleware stack (outermost to innermost):
/// - Request timeout (tower::timeout), answered with 408 and the standard error body
/// - Body size limit (tower-http::limit)
/// - Tracing (tower-http::trace)
///
/// `/health` and `/metrics` need no principal.
pub fn create_router(app_state: &AppState) -> Router<AppState> {
    let body_limit = app_state.config.body_size_limit_bytes;
    let timeout_secs = app_state.config.request_timeout_secs;

    let router = Router::new()
        .route(
            "/todos",
            get(handlers::list_todos_handler).post(handlers::create_todo_handler),
        )
        .route(
            "/todos/:task_id",
            put(handlers::update_todo_handler).delete(handlers::delete_todo_handler),
        )
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(middleware::tracing_layer())
        .layer(RequestBodyLimitLayer::new(body_limit));

    // HandleErrorLayer must come before the timeout to catch Elapsed
    let timeout_stack = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(middleware::handle_middleware_error))
        .timeout(Duration::from_secs(timeout_secs))
        .into_inner();

    router.layer(timeout_stack)
}
