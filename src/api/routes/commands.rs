//! Relay command endpoint

use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

use crate::RelayCommand;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::CommandResponse,
};

/// POST /api/commands
///
/// Publish a relay command to the field nodes
pub async fn send_command(
    State(state): State<ApiState>,
    Json(mut command): Json<RelayCommand>,
) -> ApiResult<(StatusCode, Json<CommandResponse>)> {
    command.out_node_id = command.out_node_id.trim().to_string();
    command.in_node_id = command.in_node_id.trim().to_string();

    if command.out_node_id.is_empty() || command.in_node_id.is_empty() {
        return Err(ApiError::InvalidRequest(
            "outNodeId and inNodeId are required".to_string(),
        ));
    }

    let Some(publisher) = &state.publisher else {
        return Err(ApiError::Unavailable(
            "no broker connection for relay commands".to_string(),
        ));
    };

    publisher.publish(&command).await?;
    info!(
        "relay command accepted: {} → {} {}",
        command.out_node_id, command.in_node_id, command.status
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            status: "sent".to_string(),
            command,
        }),
    ))
}
