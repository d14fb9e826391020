//! Telemetry endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::debug;

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{DEFAULT_DATA_LIMIT, HistoryParams, IngestResponse, LimitQuery, clamp_limit},
};
use crate::storage::HistoryQuery;
use crate::{HistoryPoint, TelemetrySample};

/// GET /api/data
///
/// Current record of every node, newest first
pub async fn list_current(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<TelemetrySample>>> {
    let limit = clamp_limit(query.limit, DEFAULT_DATA_LIMIT);
    Ok(Json(state.store.list_current(limit).await?))
}

/// POST /api/data
///
/// Ingest a telemetry sample over HTTP; same semantics as the MQTT topic
pub async fn ingest(
    State(state): State<ApiState>,
    Json(sample): Json<TelemetrySample>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    debug!("telemetry received over HTTP for '{}'", sample.node_id);

    let outcome = state.reconciler.reconcile(sample).await?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            node_id: outcome.node_id,
            history_recorded: outcome.history.is_ok(),
        }),
    ))
}

/// GET /api/data/history/:node_id
///
/// History points of one node in arrival order
pub async fn history(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Vec<HistoryPoint>>> {
    let query = HistoryQuery {
        node_id,
        start: params.start,
        end: params.end,
        limit: params.limit,
    };

    Ok(Json(state.history.history(query).await?))
}
