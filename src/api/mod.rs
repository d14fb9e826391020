//! REST API and WebSocket server for the monitoring hub
//!
//! This module serves the dashboard: current node state, history,
//! recorded breakdowns, alert cooldowns, relay commands and a WebSocket
//! stream of new breakdowns.
//!
//! ## Architecture
//!
//! - **Axum** web framework with tower-http layers
//! - **Pipeline handles** for ingestion and cooldown queries
//! - **WebSocket** for real-time breakdown streaming
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/stats` - Record counts
//! - `GET /api/data` - Current record per node
//! - `POST /api/data` - Ingest a telemetry sample
//! - `GET /api/data/history/{node_id}` - Node history
//! - `GET /api/alerts` - Recorded breakdowns
//! - `GET /api/nodes/{node_id}/authorities` - Responsible authorities
//! - `GET|DELETE /api/nodes/{node_id}/cooldown` - Alert cooldown
//! - `POST /api/commands` - Publish a relay command
//! - `WS /api/stream` - Real-time breakdown streaming

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
#[cfg(feature = "api")]
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tracing::info;

#[cfg(feature = "api")]
use crate::config::ApiSettings;

/// Build the router with every route and the tracing layer
#[cfg(feature = "api")]
pub fn build_router(state: ApiState) -> Router {
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/stats", get(routes::stats::get_stats))
        .route(
            "/api/data",
            get(routes::data::list_current).post(routes::data::ingest),
        )
        .route("/api/data/history/:node_id", get(routes::data::history))
        .route("/api/alerts", get(routes::alerts::list_alerts))
        .route(
            "/api/nodes/:node_id/authorities",
            get(routes::nodes::list_authorities),
        )
        .route(
            "/api/nodes/:node_id/cooldown",
            get(routes::nodes::get_cooldown).delete(routes::nodes::reset_cooldown),
        )
        .route("/api/commands", post(routes::commands::send_command))
        .route("/api/stream", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(settings: ApiSettings, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};

    info!("starting API server on {}", settings.bind_addr);

    let mut app = build_router(state);

    // Add CORS if enabled
    if settings.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    // Spawn server in background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
