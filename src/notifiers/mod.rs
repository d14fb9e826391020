//! Notification channels used by the alert coordinator
//!
//! Each channel is an async trait so the coordinator can be driven by the
//! real providers in production and by recording fakes in tests.
//!
//! - **Email**: one batched message to every recipient (`email::HttpMailer`)
//! - **SMS**: one message per recipient, per-recipient results (`sms::TwilioSms`)
//! - **Realtime**: push to every connected dashboard (`realtime::RealtimeHub`)

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::{BreakdownEvent, RecordedBreakdown};

pub mod email;
pub mod realtime;
pub mod sms;

pub use email::HttpMailer;
pub use realtime::RealtimeHub;
pub use sms::TwilioSms;

/// Event name pushed to realtime subscribers for each recorded breakdown
pub const NEW_BREAKDOWN: &str = "new-breakdown";

/// Errors reported by a notification channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NotifierError {
    /// The channel is not configured
    Disabled(String),

    /// No usable recipient for this channel
    NoRecipients,

    /// Recipient address/number rejected before sending
    InvalidRecipient(String),

    /// The call did not finish within the channel timeout
    Timeout { channel: String, after_ms: u64 },

    /// The provider could not be reached
    Transport(String),

    /// The provider answered with an error status
    Rejected { status: u16, body: String },
}

impl NotifierError {
    pub fn timeout(channel: &str, after: Duration) -> Self {
        NotifierError::Timeout {
            channel: channel.to_string(),
            after_ms: after.as_millis() as u64,
        }
    }
}

impl fmt::Display for NotifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifierError::Disabled(channel) => write!(f, "{} channel is not configured", channel),
            NotifierError::NoRecipients => write!(f, "no recipients"),
            NotifierError::InvalidRecipient(who) => write!(f, "invalid recipient: {}", who),
            NotifierError::Timeout { channel, after_ms } => {
                write!(f, "{} channel timed out after {}ms", channel, after_ms)
            }
            NotifierError::Transport(msg) => write!(f, "provider unreachable: {}", msg),
            NotifierError::Rejected { status, body } => {
                write!(f, "provider rejected request ({}): {}", status, body)
            }
        }
    }
}

impl std::error::Error for NotifierError {}

impl From<reqwest::Error> for NotifierError {
    fn from(err: reqwest::Error) -> Self {
        NotifierError::Transport(err.to_string())
    }
}

/// Result of a single SMS
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsDelivery {
    pub number: String,
    /// Provider message id on success
    pub result: Result<String, NotifierError>,
}

impl SmsDelivery {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[async_trait]
pub trait EmailNotifier: Send + Sync {
    /// Send one message addressed to all `recipients`
    async fn send(&self, recipients: &[String], event: &BreakdownEvent)
    -> Result<(), NotifierError>;
}

#[async_trait]
pub trait SmsNotifier: Send + Sync {
    /// Send one SMS per recipient; the result list matches `recipients`
    async fn send(&self, recipients: &[String], event: &BreakdownEvent) -> Vec<SmsDelivery>;
}

#[async_trait]
pub trait RealtimeNotifier: Send + Sync {
    /// Push an event to every connected subscriber, returning how many got it
    async fn broadcast(
        &self,
        event_name: &str,
        event: &RecordedBreakdown,
    ) -> Result<usize, NotifierError>;
}

/// Stand-in for a channel that has no configuration
///
/// Every send fails with `NotifierError::Disabled`, which the coordinator
/// logs like any other channel failure.
#[derive(Debug, Clone, Copy)]
pub struct DisabledChannel {
    name: &'static str,
}

impl DisabledChannel {
    pub fn email() -> Self {
        Self { name: "email" }
    }

    pub fn sms() -> Self {
        Self { name: "sms" }
    }
}

#[async_trait]
impl EmailNotifier for DisabledChannel {
    async fn send(
        &self,
        recipients: &[String],
        event: &BreakdownEvent,
    ) -> Result<(), NotifierError> {
        warn!(
            "{} alert for {} to {} recipients skipped: channel disabled",
            self.name,
            event.node_id,
            recipients.len()
        );
        Err(NotifierError::Disabled(self.name.to_string()))
    }
}

#[async_trait]
impl SmsNotifier for DisabledChannel {
    async fn send(&self, recipients: &[String], event: &BreakdownEvent) -> Vec<SmsDelivery> {
        warn!(
            "{} alert for {} to {} recipients skipped: channel disabled",
            self.name,
            event.node_id,
            recipients.len()
        );
        recipients
            .iter()
            .map(|number| SmsDelivery {
                number: number.clone(),
                result: Err(NotifierError::Disabled(self.name.to_string())),
            })
            .collect()
    }
}
