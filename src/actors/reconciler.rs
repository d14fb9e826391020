//! StateReconciler - one current record per node
//!
//! Reconciliations for the same node are serialized through a per-node async
//! mutex; different nodes never wait on each other. Within the critical
//! section the current record is replaced first and the history point is
//! appended second, so the history of a node follows the order in which its
//! samples were accepted.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

use crate::TelemetrySample;
use crate::error::{PipelineError, require_node_id};
use crate::storage::Store;

use super::history::HistoryLedger;
use super::messages::ReconcileOutcome;

#[derive(Debug, Default)]
struct NodeSlot {
    /// Newest `observed_at` accepted for the node
    last_accepted: Option<DateTime<Utc>>,
}

pub struct StateReconciler {
    store: Arc<dyn Store>,
    history: HistoryLedger,
    nodes: Mutex<HashMap<String, Arc<Mutex<NodeSlot>>>>,
    reject_stale: bool,
}

impl StateReconciler {
    pub fn new(store: Arc<dyn Store>, history: HistoryLedger, reject_stale: bool) -> Self {
        Self {
            store,
            history,
            nodes: Mutex::new(HashMap::new()),
            reject_stale,
        }
    }

    /// Make `sample` the node's only current record and log it to history
    ///
    /// Returns `Validation` for a blank node id and `StaleSample` when the
    /// recency guard is on and the sample is older than the last accepted
    /// one; in both cases nothing is written. A failed history append is
    /// reported in the outcome and leaves the current record in place.
    #[instrument(skip(self, sample), fields(node_id = %sample.node_id))]
    pub async fn reconcile(
        &self,
        mut sample: TelemetrySample,
    ) -> Result<ReconcileOutcome, PipelineError> {
        let node_id = require_node_id(&sample.node_id).inspect_err(|e| {
            warn!("discarding telemetry: {e}");
        })?;
        sample.node_id = node_id.clone();

        let slot = self.slot(&node_id).await;
        let mut slot = slot.lock().await;

        if let Some(last_accepted) = slot.last_accepted.filter(|_| self.reject_stale) {
            if sample.observed_at < last_accepted {
                let err = PipelineError::StaleSample {
                    node_id,
                    observed_at: sample.observed_at,
                    last_accepted,
                };
                warn!("{err}");
                return Err(err);
            }
        }

        self.store
            .reconcile_current(&sample)
            .await
            .inspect_err(|e| error!("failed to reconcile current state: {e}"))?;

        slot.last_accepted = Some(
            slot.last_accepted
                .map_or(sample.observed_at, |last| last.max(sample.observed_at)),
        );

        let history = self.history.append(&sample).await;
        if let Err(e) = &history {
            error!("current state updated but history append failed: {e}");
        }

        debug!(
            "reconciled {}: current={} relay={}",
            node_id, sample.current, sample.relay_state
        );

        Ok(ReconcileOutcome { node_id, history })
    }

    async fn slot(&self, node_id: &str) -> Arc<Mutex<NodeSlot>> {
        let mut nodes = self.nodes.lock().await;
        Arc::clone(nodes.entry(node_id.to_string()).or_default())
    }
}
