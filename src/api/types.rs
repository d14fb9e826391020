//! Request and response types of the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of current records returned by `GET /api/data`
pub const DEFAULT_DATA_LIMIT: usize = 20;

/// Default number of breakdowns returned by `GET /api/alerts`
pub const DEFAULT_ALERT_LIMIT: usize = 50;

/// Hard upper bound for any `limit` parameter
pub const MAX_LIMIT: usize = 1000;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: StorageHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
}

/// Response of `POST /api/data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub node_id: String,

    /// `false` when the current record was replaced but history append failed
    pub history_recorded: bool,
}

/// Response of `DELETE /api/nodes/:node_id/cooldown`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownResetResponse {
    pub node_id: String,
    pub reset: bool,
}

/// Response of `POST /api/commands`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    pub command: crate::RelayCommand,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// Query parameters for a node's history
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Start time (RFC 3339, inclusive)
    pub start: Option<DateTime<Utc>>,

    /// End time (RFC 3339, inclusive)
    pub end: Option<DateTime<Utc>>,

    /// Keep only the latest N points
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub node_id: Option<String>,
    pub limit: Option<usize>,
}

/// Clamp a requested limit into `1..=MAX_LIMIT`
pub fn clamp_limit(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_LIMIT)
}
