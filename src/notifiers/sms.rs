use std::sync::LazyLock;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info, instrument};

use super::{NotifierError, SmsDelivery, SmsNotifier};
use crate::BreakdownEvent;
use crate::config::SmsConfig;

static E164: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("E.164 pattern must compile"));

/// `true` when `number` is in E.164 form (`+` and country code)
pub fn validate_phone_number(number: &str) -> bool {
    E164.is_match(number)
}

/// Normalise Indian mobile numbers to E.164
///
/// `9876543210` and `919876543210` (with any punctuation) become
/// `+919876543210`; anything else is returned unchanged.
pub fn format_indian_number(number: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();

    if digits.starts_with("91") && digits.len() == 12 {
        return format!("+{digits}");
    }

    if digits.len() == 10 {
        return format!("+91{digits}");
    }

    number.to_string()
}

pub fn breakdown_text(event: &BreakdownEvent) -> String {
    let voltage = if event.voltage_present {
        "Present"
    } else {
        "Absent"
    };
    format!(
        "🚨 BREAKDOWN ALERT\nNode: {}\nIssue: {}\nCurrent: {}A\nVoltage: {}\nRelay: {}\nLocation: {}, {}\nTime: {}\n\nImmediate action required!",
        event.node_id,
        event.message,
        event.current,
        voltage,
        event.relay_state,
        event.location.lat,
        event.location.lon,
        event.occurred_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

/// Sends SMS through the Twilio Messages API
#[derive(Debug, Clone)]
pub struct TwilioSms {
    client: Client,
    config: SmsConfig,
}

impl TwilioSms {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// Send a single message, returning the provider's message id
    #[instrument(skip(self, body))]
    pub async fn send_single(&self, number: &str, body: &str) -> Result<String, NotifierError> {
        let to = format_indian_number(number);
        if !validate_phone_number(&to) {
            return Err(NotifierError::InvalidRecipient(number.to_string()));
        }

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, self.config.auth_token.as_ref())
            .form(&[
                ("To", to.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message: MessageResource = response.json().await?;
        Ok(message.sid)
    }

    /// Send the setup check message to one number
    pub async fn send_test(&self, number: &str) -> Result<String, NotifierError> {
        self.send_single(
            number,
            "🧪 Test SMS from Powerline Monitoring System. If you receive this, SMS setup is working!",
        )
        .await
    }
}

#[async_trait]
impl SmsNotifier for TwilioSms {
    #[instrument(skip(self, event), fields(node_id = %event.node_id))]
    async fn send(&self, recipients: &[String], event: &BreakdownEvent) -> Vec<SmsDelivery> {
        let body = breakdown_text(event);

        let deliveries = join_all(recipients.iter().map(|number| {
            let body = &body;
            async move {
                let result = self.send_single(number, body).await;
                match &result {
                    Ok(sid) => info!("SMS sent to {}. SID: {}", number, sid),
                    Err(e) => error!("SMS failed for {}: {}", number, e),
                }
                SmsDelivery {
                    number: number.clone(),
                    result,
                }
            }
        }))
        .await;

        let successful = deliveries.iter().filter(|d| d.is_success()).count();
        info!(
            "SMS results: {}/{} sent successfully",
            successful,
            recipients.len()
        );

        deliveries
    }
}
