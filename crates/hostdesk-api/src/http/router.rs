//! Axum router configuration with middleware.
//!
//! REST fallback routes are under `/api/v1/`; the chat transport is at
//! `/ws/chat`. Middleware: CORS, request tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/chat/sessions",
            post(handlers::session::start_session).get(handlers::session::list_sessions),
        )
        .route("/chat/sessions/open", get(handlers::session::get_open_session))
        .route("/chat/sessions/{id}", get(handlers::session::get_session))
        .route("/chat/sessions/{id}/end", post(handlers::session::end_session))
        .route(
            "/chat/sessions/{id}/claim",
            post(handlers::session::claim_session),
        )
        .route(
            "/chat/sessions/{id}/messages",
            get(handlers::session::get_messages),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws/chat", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
