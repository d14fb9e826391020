//! Per-node endpoints: authorities and alert cooldown

use axum::{
    Json,
    extract::{Path, State},
};

use crate::Authority;
use crate::actors::CooldownSnapshot;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::CooldownResetResponse,
};

/// GET /api/nodes/:node_id/authorities
pub async fn list_authorities(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> ApiResult<Json<Vec<Authority>>> {
    Ok(Json(state.store.query_authorities(&node_id).await?))
}

/// GET /api/nodes/:node_id/cooldown
///
/// 404 when the node has no alert state: no dispatch reached the
/// notifiers, none is pending and nothing was suppressed
pub async fn get_cooldown(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> ApiResult<Json<CooldownSnapshot>> {
    state
        .alerts
        .get_state(node_id.clone())
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no alert state for node {node_id}")))
}

/// DELETE /api/nodes/:node_id/cooldown
pub async fn reset_cooldown(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> Json<CooldownResetResponse> {
    let reset = state.alerts.reset_cooldown(node_id.clone()).await;
    Json(CooldownResetResponse { node_id, reset })
}
