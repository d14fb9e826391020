//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::state::ApiState;
use crate::api::types::{HealthResponse, StorageHealth};

/// GET /api/health
///
/// Reports the hub as up and includes the store's own health check
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let storage = match state.store.health_check().await {
        Ok(health) => StorageHealth {
            healthy: health.healthy,
            message: health.message,
        },
        Err(e) => StorageHealth {
            healthy: false,
            message: e.to_string(),
        },
    };

    Json(HealthResponse {
        status: if storage.healthy { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage,
    })
}
