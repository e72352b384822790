//! HTTP surface: router construction and serving.
//!
//! One wildcard route carries every processing request; `/health` is the
//! only other endpoint.

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::handler::{handle_processing, AppState};

/// Health check payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/{*path}", get(handle_processing))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> Result<(), std::io::Error> {
    let addr = format!("{}:{}", state.config.server.bind, state.config.server.port);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "listening");
    axum::serve(listener, router).await
}
