//! API shared state containing pipeline handles

use std::sync::Arc;

use crate::actors::{AlertHandle, HistoryLedger, Pipeline, StateReconciler};
use crate::notifiers::RealtimeHub;
use crate::storage::Store;
use crate::transport::CommandPublisher;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Read queries (current records, breakdowns, authorities)
    pub store: Arc<dyn Store>,

    /// HTTP telemetry goes through the same reconciler as MQTT telemetry
    pub reconciler: Arc<StateReconciler>,

    pub history: HistoryLedger,

    /// Handle to alert actor for cooldown status
    pub alerts: AlertHandle,

    /// Source of the WebSocket stream
    pub realtime: RealtimeHub,

    /// Relay command sink; `None` when no broker connection exists
    pub publisher: Option<Arc<dyn CommandPublisher>>,
}

impl ApiState {
    pub fn new(
        store: Arc<dyn Store>,
        pipeline: &Pipeline,
        realtime: RealtimeHub,
        publisher: Option<Arc<dyn CommandPublisher>>,
    ) -> Self {
        Self {
            store,
            reconciler: Arc::clone(&pipeline.reconciler),
            history: pipeline.history.clone(),
            alerts: pipeline.alerts.clone(),
            realtime,
            publisher,
        }
    }
}
