//! Actor-based ingestion pipeline
//!
//! Each inbound message is handled in its own task; the only long-lived
//! actor is the alert coordinator, which owns the cooldown state and talks
//! to the rest of the system through Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   MQTT event loop
//!          │
//!   ┌──────▼────────┐  telemetry   ┌─────────────────┐   ┌───────────────┐
//!   │ MessageRouter ├─────────────▶│ StateReconciler ├──▶│ HistoryLedger │
//!   └──────┬────────┘              └────────▲────────┘   └───────────────┘
//!          │ breakdown                      │
//!   ┌──────▼────────────┐            POST /api/data
//!   │ BreakdownRecorder │
//!   └──────┬─────┬──────┘
//!          │     └──────────────┐
//!   ┌──────▼──────┐      ┌──────▼─────┐
//!   │ RealtimeHub │      │ AlertActor ├──▶ email ∥ SMS
//!   └─────────────┘      └────────────┘
//! ```
//!
//! ## Components
//!
//! - **MessageRouter**: Classifies a topic, decodes the payload and spawns
//!   the matching handler
//! - **StateReconciler**: Keeps exactly one current record per node
//! - **HistoryLedger**: Appends every accepted sample to the node's history
//! - **BreakdownRecorder**: Persists fault events and fans them out
//! - **AlertActor**: Cooldown-gated email/SMS dispatch
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: The alert actor has an mpsc command channel
//! 2. **Request/Response**: oneshot channels carry outcomes back
//! 3. **Spawned handlers**: the router never waits on a handler

pub mod alert;
pub mod breakdown;
pub mod history;
pub mod messages;
pub mod pipeline;
pub mod reconciler;
pub mod router;

pub use alert::{AlertHandle, AlertSettings};
pub use breakdown::BreakdownRecorder;
pub use history::HistoryLedger;
pub use messages::{
    AlertOutcome, BreakdownOutcome, CooldownSnapshot, DispatchReport, ReconcileOutcome,
};
pub use pipeline::{Notifiers, Pipeline, PipelineSettings};
pub use reconciler::StateReconciler;
pub use router::{DiscardReason, MessageKind, MessageRouter, RouteOutcome};
