pub mod actors;
pub mod api;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod notifiers;
pub mod storage;
pub mod transport;
pub mod util;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of the relay on a line node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayState {
    #[serde(alias = "on")]
    On,
    #[serde(alias = "off")]
    Off,
    #[serde(alias = "fault")]
    Fault,
    #[default]
    #[serde(alias = "unknown")]
    Unknown,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RelayState::On => "ON",
            RelayState::Off => "OFF",
            RelayState::Fault => "FAULT",
            RelayState::Unknown => "UNKNOWN",
        };
        f.write_str(text)
    }
}

impl FromStr for RelayState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(RelayState::On),
            "OFF" => Ok(RelayState::Off),
            "FAULT" => Ok(RelayState::Fault),
            "UNKNOWN" => Ok(RelayState::Unknown),
            other => Err(format!("unknown relay state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A telemetry reading published by a field node
///
/// Field names follow what the nodes put on the wire; the camelCase names
/// used by newer firmware are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(alias = "nodeId", default)]
    pub node_id: String,

    pub current: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,

    #[serde(
        alias = "voltagePresent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub voltage_present: Option<bool>,

    #[serde(
        rename = "relay_status",
        alias = "relay",
        alias = "relayState",
        alias = "relay_state",
        default,
        deserialize_with = "util::null_as_default"
    )]
    pub relay_state: RelayState,

    #[serde(
        rename = "gps",
        alias = "location",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<GeoPoint>,

    #[serde(
        rename = "timestamp",
        alias = "observedAt",
        alias = "observed_at",
        default = "Utc::now",
        deserialize_with = "util::flexible_timestamp"
    )]
    pub observed_at: DateTime<Utc>,
}

/// A single point of a node's current history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub current: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&TelemetrySample> for HistoryPoint {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            current: sample.current,
            timestamp: sample.observed_at,
        }
    }
}

/// A fault reported by a field node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEvent {
    #[serde(alias = "nodeId", default)]
    pub node_id: String,

    #[serde(rename = "breakdown_message", alias = "message", default)]
    pub message: String,

    pub current: f64,

    #[serde(alias = "voltagePresent", default)]
    pub voltage_present: bool,

    #[serde(
        rename = "relay_status",
        alias = "relayState",
        alias = "relay_state",
        alias = "relay",
        default,
        deserialize_with = "util::null_as_default"
    )]
    pub relay_state: RelayState,

    #[serde(rename = "gps", alias = "location")]
    pub location: GeoPoint,

    #[serde(
        rename = "timestamp",
        alias = "occurredAt",
        alias = "occurred_at",
        default = "Utc::now",
        deserialize_with = "util::flexible_timestamp"
    )]
    pub occurred_at: DateTime<Utc>,
}

/// A breakdown event as it was persisted by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedBreakdown {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: BreakdownEvent,
}

/// Person or organisation responsible for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub entity_id: String,
    pub name: String,
    #[serde(alias = "number")]
    pub contact_number: String,
    #[serde(alias = "gmail")]
    pub contact_email: String,
    #[serde(alias = "pole_id")]
    pub node_id: String,
}

/// Remote relay action requested from the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayCommand {
    pub out_node_id: String,
    pub in_node_id: String,
    pub status: RelayState,
}
