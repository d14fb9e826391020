//! MessageRouter - topic classification and handler dispatch
//!
//! The router is called from the transport loop for every inbound message.
//! It never awaits a handler: telemetry and breakdowns are handled in their
//! own tasks, and the returned `JoinHandle` is only there for callers that
//! want to observe completion.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::TopicConfig;
use crate::error::PipelineError;
use crate::{BreakdownEvent, TelemetrySample};

use super::breakdown::BreakdownRecorder;
use super::reconciler::StateReconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Telemetry,
    Breakdown,
    CommandAck,
    Unknown,
}

/// Why a message was dropped without reaching a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownTopic(String),
    Decode(String),
}

#[derive(Debug)]
pub enum RouteOutcome {
    /// A handler task was spawned
    Dispatched {
        kind: MessageKind,
        handle: JoinHandle<()>,
    },

    /// Command acknowledgement, logged only
    Acknowledged,

    Discarded(DiscardReason),
}

impl RouteOutcome {
    /// Wait for the spawned handler, if any
    pub async fn finished(self) {
        if let RouteOutcome::Dispatched { handle, .. } = self {
            if let Err(e) = handle.await {
                error!("message handler panicked: {e}");
            }
        }
    }
}

pub struct MessageRouter {
    topics: TopicConfig,
    reconciler: Arc<StateReconciler>,
    recorder: Arc<BreakdownRecorder>,
}

impl MessageRouter {
    pub fn new(
        topics: TopicConfig,
        reconciler: Arc<StateReconciler>,
        recorder: Arc<BreakdownRecorder>,
    ) -> Self {
        Self {
            topics,
            reconciler,
            recorder,
        }
    }

    pub fn topics(&self) -> &TopicConfig {
        &self.topics
    }

    pub fn classify(&self, topic: &str) -> MessageKind {
        if topic == self.topics.telemetry {
            MessageKind::Telemetry
        } else if topic == self.topics.breakdown {
            MessageKind::Breakdown
        } else if topic == self.topics.command_ack {
            MessageKind::CommandAck
        } else {
            MessageKind::Unknown
        }
    }

    /// Classify, decode and hand off one inbound message
    ///
    /// Must be called from within a tokio runtime.
    pub fn route(&self, topic: &str, payload: &[u8]) -> RouteOutcome {
        let kind = self.classify(topic);
        trace!("message on {topic} classified as {kind:?}");

        match kind {
            MessageKind::Unknown => {
                debug!("ignoring message on unknown topic {topic}");
                RouteOutcome::Discarded(DiscardReason::UnknownTopic(topic.to_string()))
            }

            MessageKind::CommandAck => match decode::<serde_json::Value>(topic, payload) {
                Ok(ack) => {
                    info!("command acknowledged: {ack}");
                    RouteOutcome::Acknowledged
                }
                Err(reason) => RouteOutcome::Discarded(reason),
            },

            MessageKind::Telemetry => match decode::<TelemetrySample>(topic, payload) {
                Ok(sample) => {
                    let reconciler = Arc::clone(&self.reconciler);
                    let handle = tokio::spawn(async move {
                        // the reconciler already logged the failure
                        let _ = reconciler.reconcile(sample).await;
                    });
                    RouteOutcome::Dispatched { kind, handle }
                }
                Err(reason) => RouteOutcome::Discarded(reason),
            },

            MessageKind::Breakdown => match decode::<BreakdownEvent>(topic, payload) {
                Ok(event) => {
                    let recorder = Arc::clone(&self.recorder);
                    let handle = tokio::spawn(async move {
                        let _ = recorder.record(event).await;
                    });
                    RouteOutcome::Dispatched { kind, handle }
                }
                Err(reason) => RouteOutcome::Discarded(reason),
            },
        }
    }
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Result<T, DiscardReason> {
    serde_json::from_slice(payload).map_err(|e| {
        let err = PipelineError::from(e);
        warn!("discarding message on {topic}: {err}");
        DiscardReason::Decode(err.to_string())
    })
}
