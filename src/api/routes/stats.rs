//! System statistics endpoint

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::api::{error::ApiResult, state::ApiState, types::MAX_LIMIT};

/// GET /api/stats
///
/// Returns record counts and the number of live stream subscribers
pub async fn get_stats(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let breakdowns = state.store.count_breakdowns().await?;
    let nodes = state.store.list_current(MAX_LIMIT).await?.len();

    Ok(Json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "nodes_reporting": nodes,
        "breakdowns_recorded": breakdowns,
        "stream_subscribers": state.realtime.subscriber_count(),
    })))
}
