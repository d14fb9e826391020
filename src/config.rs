use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::util;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./powerline.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Storage configuration (optional - defaults to in-memory)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub alerts: AlertConfig,

    /// Mail relay; alerts go out without email when missing
    pub email: Option<EmailConfig>,

    /// SMS provider; alerts go out without SMS when missing
    pub sms: Option<SmsConfig>,

    #[serde(default)]
    pub api: ApiSettings,
}

impl Config {
    /// Fill secrets that were left out of the file from the environment
    pub fn with_env_secrets(mut self) -> Self {
        if let Some(host) = util::get_mqtt_host() {
            self.broker.host = host;
        }
        if let Some(email) = self.email.as_mut()
            && email.token.is_none()
        {
            email.token = util::get_email_token();
        }
        if let Some(sms) = self.sms.as_mut()
            && sms.auth_token.is_none()
        {
            sms.auth_token = util::get_twilio_auth_token();
        }
        self
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    #[serde(default)]
    pub topics: TopicConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            keep_alive_secs: default_keep_alive(),
            client_id_prefix: default_client_id_prefix(),
            topics: TopicConfig::default(),
        }
    }
}

fn default_broker_host() -> String {
    "broker.hivemq.com".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

fn default_client_id_prefix() -> String {
    "powerline-hub".to_string()
}

/// Topic names on the broker
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub telemetry: String,
    pub breakdown: String,
    pub command_ack: String,
    pub command: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            telemetry: "powerline/sensor/data".to_string(),
            breakdown: "powerline/breakdown".to_string(),
            command_ack: "powerline/command/ack".to_string(),
            command: "powerline/command".to_string(),
        }
    }
}

impl TopicConfig {
    /// Topics the hub subscribes to
    pub fn inbound(&self) -> [&str; 3] {
        [
            self.telemetry.as_str(),
            self.breakdown.as_str(),
            self.command_ack.as_str(),
        ]
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlertConfig {
    /// Minimum time between two alert attempts for the same node
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Upper bound for a single notifier channel call
    #[serde(default = "default_channel_timeout_secs")]
    pub channel_timeout_secs: u64,

    /// Drop telemetry older than the last accepted sample of the same node
    #[serde(default)]
    pub reject_stale: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            channel_timeout_secs: default_channel_timeout_secs(),
            reject_stale: false,
        }
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_secs)
    }
}

fn default_cooldown_secs() -> u64 {
    5 * 60
}

fn default_channel_timeout_secs() -> u64 {
    30
}

/// HTTP mail relay
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EmailConfig {
    pub url: String,
    pub from: String,
    /// Bearer token; falls back to `EMAIL_TOKEN`
    pub token: Option<String>,
}

/// Twilio account used for SMS
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SmsConfig {
    pub account_sid: String,
    pub from_number: String,
    /// Falls back to `TWILIO_AUTH_TOKEN`
    pub auth_token: Option<String>,
    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_enable_cors() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
