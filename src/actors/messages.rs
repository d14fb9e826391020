//! Message types for actor communication
//!
//! This module defines the commands accepted by the alert actor and the
//! outcomes reported by each pipeline stage.
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to the alert actor via mpsc
//! 2. **Outcomes**: Plain values handed back to callers so tests and the API
//!    can observe what a stage did without inspecting logs

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::cooldown::CooldownPhase;
use crate::notifiers::{NotifierError, SmsDelivery};
use crate::storage::StorageError;
use crate::{BreakdownEvent, RecordedBreakdown};

/// Commands that can be sent to the AlertActor
#[derive(Debug)]
pub enum AlertCommand {
    /// A breakdown was recorded and may need to be fanned out
    ///
    /// The reply is sent once the dispatch finished (or was suppressed).
    Breakdown {
        event: BreakdownEvent,
        respond_to: oneshot::Sender<AlertOutcome>,
    },

    /// Authorities were found; the claimed attempt starts the cooldown
    ///
    /// Internal: sent by the dispatch task before calling the notifiers.
    ClaimConfirmed {
        node_id: String,
        claimed_at: DateTime<Utc>,
    },

    /// Undo a cooldown claim whose dispatch never reached a notifier
    ///
    /// Internal: sent by the dispatch task when no authority was found or
    /// the lookup failed.
    ReleaseClaim {
        node_id: String,
        claimed_at: DateTime<Utc>,
    },

    /// Record the result of a finished dispatch
    ///
    /// Internal: sent by the dispatch task.
    DispatchFinished { node_id: String, delivered: bool },

    /// Get the cooldown state for a node
    GetState {
        node_id: String,
        respond_to: oneshot::Sender<Option<CooldownSnapshot>>,
    },

    /// Forget the cooldown of a node so the next breakdown dispatches
    ResetCooldown {
        node_id: String,
        respond_to: oneshot::Sender<bool>,
    },

    /// Gracefully shut down the alert actor
    ///
    /// Dispatches already in flight run to completion.
    Shutdown,
}

/// Cooldown state of a node as seen by operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CooldownSnapshot {
    pub node_id: String,

    pub phase: CooldownPhase,

    /// When the last confirmed attempt started
    pub last_alert_sent_at: Option<DateTime<Utc>>,

    /// Seconds until the node is ready again (rounded up)
    pub remaining_secs: Option<u64>,

    /// Dispatches that reached the notifiers
    pub attempts: u64,

    /// Breakdowns suppressed by the cooldown
    pub suppressed: u64,

    /// Whether the last finished dispatch delivered its email
    pub last_delivered: Option<bool>,
}

/// What the alert coordinator did with a breakdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Notifiers were called; see the report for per-channel results
    Dispatched(DispatchReport),

    /// The node is cooling down
    Suppressed { remaining: Duration },

    /// Nobody is responsible for the node; nothing was sent
    NoAuthorities,

    /// Authorities could not be loaded; nothing was sent
    LookupFailed(String),

    /// The alert actor is not running
    Unavailable,
}

impl AlertOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, AlertOutcome::Dispatched(_))
    }
}

/// Per-channel results of one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub node_id: String,
    pub emails: Vec<String>,
    pub numbers: Vec<String>,
    pub email: Result<(), NotifierError>,
    pub sms: Vec<SmsDelivery>,
    pub attempted_at: DateTime<Utc>,
}

impl DispatchReport {
    /// An attempt counts as delivered when the email went out
    pub fn delivered(&self) -> bool {
        self.email.is_ok()
    }

    pub fn sms_sent(&self) -> usize {
        self.sms.iter().filter(|d| d.is_success()).count()
    }
}

/// Result of reconciling one telemetry sample
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub node_id: String,

    /// History append result; a failure here never undoes the current record
    pub history: Result<(), StorageError>,
}

/// Result of recording one breakdown
#[derive(Debug)]
pub struct BreakdownOutcome {
    pub recorded: RecordedBreakdown,
    pub broadcast: Result<usize, NotifierError>,
    pub alert: AlertOutcome,
}
