//! Append-only telemetry history

use std::sync::Arc;

use tracing::trace;

use crate::storage::{HistoryQuery, StorageResult, Store};
use crate::{HistoryPoint, TelemetrySample};

/// Writer and reader of the per-node history log
///
/// Points are only ever appended; there is no retention bound.
#[derive(Clone)]
pub struct HistoryLedger {
    store: Arc<dyn Store>,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append `{current, observed_at}` of an accepted sample
    pub async fn append(&self, sample: &TelemetrySample) -> StorageResult<()> {
        trace!("appending history point for {}", sample.node_id);
        self.store
            .append_history(&sample.node_id, HistoryPoint::from(sample))
            .await
    }

    /// Points of one node in arrival order
    pub async fn history(&self, query: HistoryQuery) -> StorageResult<Vec<HistoryPoint>> {
        self.store.query_history(query).await
    }
}
