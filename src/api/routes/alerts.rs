//! Breakdown history endpoint

use axum::{
    Json,
    extract::{Query, State},
};

use crate::RecordedBreakdown;
use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{AlertQuery, DEFAULT_ALERT_LIMIT, clamp_limit},
};

/// GET /api/alerts
///
/// Recorded breakdowns, newest first, optionally for one node
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertQuery>,
) -> ApiResult<Json<Vec<RecordedBreakdown>>> {
    let limit = clamp_limit(query.limit, DEFAULT_ALERT_LIMIT);
    let node_id = query.node_id.as_deref().map(str::trim).filter(|id| !id.is_empty());

    Ok(Json(state.store.list_breakdowns(node_id, limit).await?))
}
