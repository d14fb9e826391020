//! Transports between the hub and the field nodes
//!
//! Inbound messages reach the pipeline through `MessageRouter::route`;
//! outbound relay commands go through a `CommandPublisher`.

use async_trait::async_trait;

use crate::RelayCommand;

pub mod mqtt;

pub use mqtt::{MqttCommandPublisher, MqttListener};

/// Sends relay commands to the field
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, command: &RelayCommand) -> anyhow::Result<()>;
}
