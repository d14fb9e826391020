//! Wiring of the ingestion pipeline

use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, TopicConfig};
use crate::cooldown::Clock;
use crate::notifiers::{EmailNotifier, RealtimeNotifier, SmsNotifier};
use crate::storage::Store;

use super::alert::{AlertHandle, AlertSettings};
use super::breakdown::BreakdownRecorder;
use super::history::HistoryLedger;
use super::reconciler::StateReconciler;
use super::router::MessageRouter;

/// Notification channels handed to the pipeline
#[derive(Clone)]
pub struct Notifiers {
    pub email: Arc<dyn EmailNotifier>,
    pub sms: Arc<dyn SmsNotifier>,
    pub realtime: Arc<dyn RealtimeNotifier>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub topics: TopicConfig,
    pub alerts: AlertSettings,
    pub reject_stale: bool,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            topics: config.broker.topics.clone(),
            alerts: AlertSettings::from(&config.alerts),
            reject_stale: config.alerts.reject_stale,
        }
    }
}

/// Every stage of the pipeline, ready to be driven by a transport or the API
#[derive(Clone)]
pub struct Pipeline {
    pub router: Arc<MessageRouter>,
    pub reconciler: Arc<StateReconciler>,
    pub recorder: Arc<BreakdownRecorder>,
    pub history: HistoryLedger,
    pub alerts: AlertHandle,
}

impl Pipeline {
    /// Build the stages and spawn the alert actor
    pub fn spawn(
        store: Arc<dyn Store>,
        notifiers: Notifiers,
        settings: PipelineSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!(
            "starting pipeline: cooldown {:?}, channel timeout {:?}, reject stale {}",
            settings.alerts.cooldown, settings.alerts.channel_timeout, settings.reject_stale
        );

        let alerts = AlertHandle::spawn(
            Arc::clone(&store),
            notifiers.email,
            notifiers.sms,
            settings.alerts,
            clock,
        );

        let history = HistoryLedger::new(Arc::clone(&store));
        let reconciler = Arc::new(StateReconciler::new(
            Arc::clone(&store),
            history.clone(),
            settings.reject_stale,
        ));
        let recorder = Arc::new(BreakdownRecorder::new(
            store,
            notifiers.realtime,
            alerts.clone(),
        ));
        let router = Arc::new(MessageRouter::new(
            settings.topics,
            Arc::clone(&reconciler),
            Arc::clone(&recorder),
        ));

        Self {
            router,
            reconciler,
            recorder,
            history,
            alerts,
        }
    }
}
