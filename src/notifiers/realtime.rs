//! Fan-out of recorded breakdowns to live dashboard connections

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use super::{NotifierError, RealtimeNotifier};
use crate::RecordedBreakdown;

/// Message delivered to realtime subscribers
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub event: String,
    pub data: RecordedBreakdown,
}

/// Broadcast hub behind the WebSocket stream
///
/// Slow subscribers lag and lose old messages rather than holding up the
/// pipeline; the breakdown itself is already persisted at this point.
#[derive(Debug, Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<RealtimeMessage>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RealtimeNotifier for RealtimeHub {
    async fn broadcast(
        &self,
        event_name: &str,
        event: &RecordedBreakdown,
    ) -> Result<usize, NotifierError> {
        let message = RealtimeMessage {
            event: event_name.to_string(),
            data: event.clone(),
        };

        // no subscribers is not an error: nobody has the dashboard open
        match self.tx.send(message) {
            Ok(receivers) => {
                trace!("pushed {event_name} to {receivers} subscribers");
                Ok(receivers)
            }
            Err(_) => {
                trace!("no realtime subscribers for {event_name}");
                Ok(0)
            }
        }
    }
}
