//! MQTT listener and command publisher (rumqttc)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rumqttc::{
    AsyncClient,
    Event::{Incoming, Outgoing},
    EventLoop, MqttOptions,
    Packet::{ConnAck, Publish},
    QoS,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use super::CommandPublisher;
use crate::RelayCommand;
use crate::actors::MessageRouter;
use crate::config::BrokerConfig;

/// Delay before polling again after a connection error
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Drives the MQTT event loop and feeds every publish into the router
pub struct MqttListener {
    client: AsyncClient,
    eventloop: EventLoop,
    router: Arc<MessageRouter>,
}

impl MqttListener {
    pub fn new(config: &BrokerConfig, router: Arc<MessageRouter>) -> Self {
        let client_id = format!("{}-{}", config.client_id_prefix, Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(options, 64);

        Self {
            client,
            eventloop,
            router,
        }
    }

    /// Publisher sharing this listener's connection
    pub fn publisher(&self) -> MqttCommandPublisher {
        MqttCommandPublisher::new(self.client.clone(), &self.router.topics().command)
    }

    /// Poll the broker until `shutdown` fires
    ///
    /// Connection errors are logged and retried; rumqttc reconnects on the
    /// next poll. Subscriptions are (re)issued on every ConnAck.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        info!("starting MQTT listener");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("MQTT listener received shutdown signal");
                    break;
                }

                event = self.eventloop.poll() => {
                    match event {
                        Ok(Incoming(ConnAck(_))) => self.subscribe(),

                        Ok(Incoming(Publish(message))) => {
                            trace!(
                                "received {} bytes on {}",
                                message.payload.len(),
                                message.topic
                            );
                            let _ = self.router.route(&message.topic, &message.payload);
                        }

                        Ok(Incoming(packet)) => trace!("incoming packet: {packet:?}"),

                        Ok(Outgoing(packet)) => trace!("outgoing packet: {packet:?}"),

                        Err(e) => {
                            error!("MQTT connection error: {e}");
                            tokio::time::sleep(RECONNECT_BACKOFF).await;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.client.disconnect().await {
            warn!("error disconnecting MQTT client: {e}");
        }

        info!("MQTT listener stopped");
    }

    fn subscribe(&self) {
        for topic in self.router.topics().inbound() {
            // try_* so the request never waits on the event loop we are driving
            match self.client.try_subscribe(topic, QoS::AtLeastOnce) {
                Ok(()) => info!("subscribed to {topic}"),
                Err(e) => error!("failed to subscribe to {topic}: {e}"),
            }
        }
    }
}

/// Publishes relay commands as JSON at QoS 1
#[derive(Clone)]
pub struct MqttCommandPublisher {
    client: AsyncClient,
    topic: String,
}

impl MqttCommandPublisher {
    pub fn new(client: AsyncClient, topic: &str) -> Self {
        Self {
            client,
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl CommandPublisher for MqttCommandPublisher {
    async fn publish(&self, command: &RelayCommand) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(command)?;

        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .with_context(|| format!("publishing relay command to {}", self.topic))?;

        info!(
            "relay command published to {}: {} → {} {}",
            self.topic, command.out_node_id, command.in_node_id, command.status
        );
        Ok(())
    }
}
