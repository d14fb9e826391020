//! Per-node alert cooldown
//!
//! ```text
//! last_alert_sent_at == None            → CooldownEvaluation::Ready
//! now - last_alert_sent_at >= window    → CooldownEvaluation::Ready
//! now - last_alert_sent_at <  window    → CooldownEvaluation::CoolingDown { remaining }
//! ```
//!
//! The evaluation is a pure function of the last attempt, the current time
//! and the window; the alert actor owns the state and the clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Default cooldown window between two alert attempts for one node
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownEvaluation {
    Ready,
    CoolingDown { remaining: Duration },
}

impl CooldownEvaluation {
    pub fn evaluate(
        last_alert_sent_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> CooldownEvaluation {
        let Some(last) = last_alert_sent_at else {
            return CooldownEvaluation::Ready;
        };

        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        let elapsed = now.signed_duration_since(last);

        if elapsed >= window {
            return CooldownEvaluation::Ready;
        }

        // a clock that went backwards shows up as negative elapsed time and
        // keeps the node cooling down for longer, never shorter
        let remaining = (window - elapsed).to_std().unwrap_or(Duration::MAX);
        CooldownEvaluation::CoolingDown { remaining }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CooldownEvaluation::Ready)
    }
}

/// Phase of a node in the cooldown state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CooldownPhase {
    Ready,

    /// An attempt was claimed and its authority lookup is still running
    Pending,

    CoolingDown,
}

impl From<CooldownEvaluation> for CooldownPhase {
    fn from(evaluation: CooldownEvaluation) -> Self {
        match evaluation {
            CooldownEvaluation::Ready => CooldownPhase::Ready,
            CooldownEvaluation::CoolingDown { .. } => CooldownPhase::CoolingDown,
        }
    }
}

/// Source of "now" for the alert actor
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
