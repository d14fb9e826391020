use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument};

use super::{EmailNotifier, NotifierError};
use crate::BreakdownEvent;
use crate::config::EmailConfig;

/// Sends alert mail through an HTTP mail relay
///
/// The relay receives `{from, to, subject, html}` as JSON and is expected to
/// answer with a 2xx status once the message is accepted.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: Client,
    config: EmailConfig,
}

impl HttpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

pub fn breakdown_subject(event: &BreakdownEvent) -> String {
    format!("🚨 BREAKDOWN ALERT - Node {}", event.node_id)
}

/// Escape text taken from a node's payload before it goes into the HTML body
fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn breakdown_html(event: &BreakdownEvent) -> String {
    let voltage = if event.voltage_present { "Yes" } else { "No" };
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
    <h2 style="color: #d32f2f;">⚡ POWERLINE BREAKDOWN ALERT</h2>
    <div style="background-color: #ffebee; padding: 15px; border-radius: 5px; margin: 10px 0;">
        <h3>Breakdown Details:</h3>
        <p><strong>Node ID:</strong> {node}</p>
        <p><strong>Message:</strong> {message}</p>
        <p><strong>Current:</strong> {current} A</p>
        <p><strong>Voltage Present:</strong> {voltage}</p>
        <p><strong>Relay Status:</strong> {relay}</p>
        <p><strong>Time:</strong> {time}</p>
    </div>
    <div style="background-color: #e8f5e8; padding: 15px; border-radius: 5px; margin: 10px 0;">
        <h3>Location:</h3>
        <p><strong>Latitude:</strong> {lat}</p>
        <p><strong>Longitude:</strong> {lon}</p>
    </div>
    <div style="background-color: #fff3e0; padding: 15px; border-radius: 5px; margin: 10px 0;">
        <p><strong>⚠️ IMMEDIATE ACTION REQUIRED</strong></p>
        <p>Please investigate and resolve this issue immediately.</p>
    </div>
    <hr>
    <p style="color: #666; font-size: 12px;">
        This is an automated alert from Powerline Monitoring System.<br>
        Generated on: {generated}
    </p>
</div>"#,
        node = html_escape(&event.node_id),
        message = html_escape(&event.message),
        current = event.current,
        relay = event.relay_state,
        time = event.occurred_at.format("%Y-%m-%d %H:%M:%S UTC"),
        lat = event.location.lat,
        lon = event.location.lon,
        generated = Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[async_trait]
impl EmailNotifier for HttpMailer {
    #[instrument(skip(self, event), fields(node_id = %event.node_id))]
    async fn send(
        &self,
        recipients: &[String],
        event: &BreakdownEvent,
    ) -> Result<(), NotifierError> {
        if recipients.is_empty() {
            return Err(NotifierError::NoRecipients);
        }

        let payload = json!({
            "from": self.config.from,
            "to": recipients,
            "subject": breakdown_subject(event),
            "html": breakdown_html(event),
        });

        let mut request = self.client.post(&self.config.url).json(&payload);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.inspect_err(|e| {
            error!("Error sending breakdown alert emails: {}", e);
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Mail relay rejected breakdown alert with status: {}", status);
            return Err(NotifierError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Breakdown alert emails sent to: {:?}", recipients);
        Ok(())
    }
}
