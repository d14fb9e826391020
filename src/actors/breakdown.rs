//! BreakdownRecorder - permanent record of every fault event

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::BreakdownEvent;
use crate::error::{PipelineError, require_node_id};
use crate::notifiers::{NEW_BREAKDOWN, RealtimeNotifier};
use crate::storage::Store;

use super::alert::AlertHandle;
use super::messages::BreakdownOutcome;

pub struct BreakdownRecorder {
    store: Arc<dyn Store>,
    realtime: Arc<dyn RealtimeNotifier>,
    alerts: AlertHandle,
}

impl BreakdownRecorder {
    pub fn new(
        store: Arc<dyn Store>,
        realtime: Arc<dyn RealtimeNotifier>,
        alerts: AlertHandle,
    ) -> Self {
        Self {
            store,
            realtime,
            alerts,
        }
    }

    /// Persist the event, then broadcast it and hand it to the alert
    /// coordinator concurrently
    ///
    /// Events are never deduplicated. If persisting fails neither the
    /// broadcast nor the alert happens.
    #[instrument(skip(self, event), fields(node_id = %event.node_id))]
    pub async fn record(&self, mut event: BreakdownEvent) -> Result<BreakdownOutcome, PipelineError> {
        event.node_id = require_node_id(&event.node_id).inspect_err(|e| {
            warn!("discarding breakdown: {e}");
        })?;

        let recorded = self
            .store
            .append_breakdown(&event)
            .await
            .inspect_err(|e| error!("failed to record breakdown, no alert sent: {e}"))?;

        info!(
            "breakdown #{} recorded for {}: {}",
            recorded.id, event.node_id, event.message
        );

        let (broadcast, alert) = tokio::join!(
            self.realtime.broadcast(NEW_BREAKDOWN, &recorded),
            self.alerts.notify(event)
        );

        if let Err(e) = &broadcast {
            warn!("realtime broadcast of breakdown #{} failed: {e}", recorded.id);
        }

        Ok(BreakdownOutcome {
            recorded,
            broadcast,
            alert,
        })
    }
}
