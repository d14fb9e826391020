use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

const EMAIL_TOKEN: &str = "EMAIL_TOKEN";

const TWILIO_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";

const MQTT_HOST: &str = "MQTT_HOST";

pub fn get_email_token() -> Option<String> {
    std::env::var(EMAIL_TOKEN).ok()
}

pub fn get_twilio_auth_token() -> Option<String> {
    std::env::var(TWILIO_AUTH_TOKEN).ok()
}

pub fn get_mqtt_host() -> Option<String> {
    std::env::var(MQTT_HOST).ok()
}

/// Treat an explicit `null` like a missing field
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

/// Accept RFC 3339 strings or Unix epoch milliseconds. `null` means "now".
pub fn flexible_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => Ok(Utc::now()),
        Some(RawTimestamp::Millis(millis)) => DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {millis}"))),
        Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{text}': {e}"))),
    }
}
