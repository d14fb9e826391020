//! Store trait definition
//!
//! This module defines the `Store` trait the ingestion pipeline writes
//! through. The pipeline never sees a concrete database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::{Authority, BreakdownEvent, HistoryPoint, RecordedBreakdown, TelemetrySample};

/// Query parameters for a node's history
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub node_id: String,

    /// Start of time range (inclusive)
    pub start: Option<DateTime<Utc>>,

    /// End of time range (inclusive)
    pub end: Option<DateTime<Utc>>,

    /// Keep only the most recent `limit` points
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn all(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            start: None,
            end: None,
            limit: None,
        }
    }

    pub fn latest(node_id: impl Into<String>, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::all(node_id)
        }
    }

    pub(crate) fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| *timestamp >= start)
            && self.end.is_none_or(|end| *timestamp <= end)
    }
}

/// Health status of the store
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Persistence contract used by the pipeline and the query API
///
/// ## Layout
///
/// - **current telemetry**: one row per node, replaced atomically
/// - **history**: append-only, grouped by node, ordered by arrival
/// - **breakdown events**: append-only, never updated or deduplicated
/// - **authorities**: many per node, maintained outside the pipeline
///
/// Implementations must be `Send + Sync`; every handler task holds a clone
/// of the same `Arc<dyn Store>`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Replace the current record for `sample.node_id`
    ///
    /// Must be a single atomic replace: after it returns, exactly one
    /// current record exists for the node and it equals `sample`.
    async fn reconcile_current(&self, sample: &TelemetrySample) -> StorageResult<()>;

    /// Current record of a single node
    async fn current_for(&self, node_id: &str) -> StorageResult<Option<TelemetrySample>>;

    /// Current records of all nodes, most recently observed first
    async fn list_current(&self, limit: usize) -> StorageResult<Vec<TelemetrySample>>;

    /// Append a point to a node's history
    async fn append_history(&self, node_id: &str, point: HistoryPoint) -> StorageResult<()>;

    /// History of a node in arrival order (oldest first)
    async fn query_history(&self, query: HistoryQuery) -> StorageResult<Vec<HistoryPoint>>;

    /// Insert a breakdown event. Always inserts.
    async fn append_breakdown(&self, event: &BreakdownEvent) -> StorageResult<RecordedBreakdown>;

    /// Recorded breakdowns, newest first, optionally for a single node
    async fn list_breakdowns(
        &self,
        node_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<RecordedBreakdown>>;

    /// Total number of recorded breakdowns
    async fn count_breakdowns(&self) -> StorageResult<u64>;

    /// Authorities registered against a node
    async fn query_authorities(&self, node_id: &str) -> StorageResult<Vec<Authority>>;

    /// Register or update an authority (keyed by `entity_id`)
    async fn upsert_authority(&self, authority: Authority) -> StorageResult<()>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
