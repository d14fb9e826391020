//! AlertActor - Cooldown-gated alert fanout
//!
//! ## Cooldown State Machine
//!
//! The actor owns one cooldown entry per node:
//!
//! ```text
//! READY        ─ breakdown ─▶ claim ─▶ PENDING (authority lookup running)
//! PENDING      ─ breakdown ─▶ parked
//! PENDING      ─ authorities found ─▶ last_alert_sent_at = claim time ─▶ COOLING_DOWN
//! PENDING      ─ no authorities / lookup failed ─▶ READY, parked events handled again
//! COOLING_DOWN ─ breakdown ─▶ suppressed
//! COOLING_DOWN ─ window elapsed ─▶ READY
//! ```
//!
//! The claim is taken inside the actor loop, so two breakdowns for the same
//! node can never both dispatch. Events parked behind a claim are answered
//! once the claim resolves: suppressed against the confirmed attempt, or
//! evaluated again when the claim is released. Authority lookup and notifier
//! I/O run in a spawned task; the actor only ever touches its own map.
//!
//! Entries are kept for the lifetime of the process once an attempt was
//! confirmed or an event suppressed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    Authority, BreakdownEvent,
    config::AlertConfig,
    cooldown::{Clock, CooldownEvaluation, CooldownPhase, DEFAULT_COOLDOWN},
    notifiers::{EmailNotifier, NotifierError, SmsDelivery, SmsNotifier},
    storage::Store,
};

use super::messages::{AlertCommand, AlertOutcome, CooldownSnapshot, DispatchReport};

/// Timing knobs of the alert coordinator, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertSettings {
    pub cooldown: Duration,
    pub channel_timeout: Duration,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            channel_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AlertConfig> for AlertSettings {
    fn from(config: &AlertConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            channel_timeout: config.channel_timeout(),
        }
    }
}

/// A breakdown waiting for the node's pending claim to resolve
#[derive(Debug)]
struct ParkedEvent {
    event: BreakdownEvent,
    respond_to: oneshot::Sender<AlertOutcome>,
}

/// An attempt whose authority lookup has not finished yet
#[derive(Debug)]
struct PendingClaim {
    claimed_at: DateTime<Utc>,
    parked: VecDeque<ParkedEvent>,
}

/// Per-node cooldown entry
#[derive(Debug, Default)]
struct NodeCooldown {
    /// Start of the last confirmed attempt
    last_alert_sent_at: Option<DateTime<Utc>>,

    pending: Option<PendingClaim>,

    attempts: u64,

    suppressed: u64,

    last_delivered: Option<bool>,
}

impl NodeCooldown {
    /// Nothing worth reporting was ever recorded for the node
    fn is_blank(&self) -> bool {
        self.last_alert_sent_at.is_none()
            && self.pending.is_none()
            && self.attempts == 0
            && self.suppressed == 0
    }
}

/// Channel side of an alert: authority lookup plus email and SMS fanout
struct Dispatcher {
    store: Arc<dyn Store>,
    email: Arc<dyn EmailNotifier>,
    sms: Arc<dyn SmsNotifier>,
    channel_timeout: Duration,
}

impl Dispatcher {
    /// Authorities of the node, or the outcome that ends the attempt
    #[instrument(skip(self, event), fields(node_id = %event.node_id))]
    async fn lookup(&self, event: &BreakdownEvent) -> Result<Vec<Authority>, AlertOutcome> {
        let authorities = self
            .store
            .query_authorities(&event.node_id)
            .await
            .map_err(|e| {
                error!("could not load authorities for {}: {e}", event.node_id);
                AlertOutcome::LookupFailed(e.to_string())
            })?;

        if authorities.is_empty() {
            warn!("no authorities found for node {}, nothing sent", event.node_id);
            return Err(AlertOutcome::NoAuthorities);
        }

        Ok(authorities)
    }

    #[instrument(skip_all, fields(node_id = %event.node_id))]
    async fn fan_out(
        &self,
        event: &BreakdownEvent,
        authorities: &[Authority],
        attempted_at: DateTime<Utc>,
    ) -> DispatchReport {
        let emails = collect_contacts(authorities, |a| &a.contact_email);
        let numbers = collect_contacts(authorities, |a| &a.contact_number);

        debug!(
            "dispatching breakdown alert for {} to {} emails and {} numbers",
            event.node_id,
            emails.len(),
            numbers.len()
        );

        // neither channel waits for, or cancels, the other
        let (email, sms) = tokio::join!(
            self.send_email(&emails, event),
            self.send_sms(&numbers, event)
        );

        if let Err(e) = &email {
            error!("email alert for {} failed: {e}", event.node_id);
        }

        let report = DispatchReport {
            node_id: event.node_id.clone(),
            emails,
            numbers,
            email,
            sms,
            attempted_at,
        };

        info!(
            "breakdown alert for {}: email {}, {}/{} SMS sent",
            event.node_id,
            if report.delivered() { "sent" } else { "failed" },
            report.sms_sent(),
            report.numbers.len()
        );

        report
    }

    async fn send_email(
        &self,
        recipients: &[String],
        event: &BreakdownEvent,
    ) -> Result<(), NotifierError> {
        if recipients.is_empty() {
            return Err(NotifierError::NoRecipients);
        }

        match timeout(self.channel_timeout, self.email.send(recipients, event)).await {
            Ok(result) => result,
            Err(_) => Err(NotifierError::timeout("email", self.channel_timeout)),
        }
    }

    async fn send_sms(&self, recipients: &[String], event: &BreakdownEvent) -> Vec<SmsDelivery> {
        if recipients.is_empty() {
            trace!("no SMS recipients for {}", event.node_id);
            return Vec::new();
        }

        match timeout(self.channel_timeout, self.sms.send(recipients, event)).await {
            Ok(deliveries) => deliveries,
            Err(_) => {
                warn!(
                    "SMS channel for {} timed out after {:?}",
                    event.node_id, self.channel_timeout
                );
                recipients
                    .iter()
                    .map(|number| SmsDelivery {
                        number: number.clone(),
                        result: Err(NotifierError::timeout("sms", self.channel_timeout)),
                    })
                    .collect()
            }
        }
    }
}

/// Non-empty, de-duplicated contact values in authority order
fn collect_contacts(authorities: &[Authority], field: impl Fn(&Authority) -> &String) -> Vec<String> {
    let mut contacts: Vec<String> = Vec::with_capacity(authorities.len());
    for authority in authorities {
        let contact = field(authority).trim();
        if !contact.is_empty() && !contacts.iter().any(|c| c == contact) {
            contacts.push(contact.to_string());
        }
    }
    contacts
}

/// Send a follow-up command from a dispatch task to the actor
async fn report_back(self_tx: &mpsc::WeakSender<AlertCommand>, cmd: AlertCommand) {
    if let Some(tx) = self_tx.upgrade() {
        let _ = tx.send(cmd).await;
    }
}

/// Actor that owns the cooldown map and starts dispatches
pub struct AlertActor {
    /// Per-node cooldown
    nodes: HashMap<String, NodeCooldown>,

    /// Command receiver
    command_rx: mpsc::Receiver<AlertCommand>,

    /// Used by dispatch tasks to report back; weak so the actor still stops
    /// once every handle is gone
    self_tx: mpsc::WeakSender<AlertCommand>,

    dispatcher: Arc<Dispatcher>,

    settings: AlertSettings,

    clock: Arc<dyn Clock>,
}

impl AlertActor {
    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alert actor");

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        AlertCommand::Breakdown { event, respond_to } => {
                            self.handle_breakdown(event, respond_to);
                        }

                        AlertCommand::ClaimConfirmed { node_id, claimed_at } => {
                            self.confirm_claim(&node_id, claimed_at);
                        }

                        AlertCommand::ReleaseClaim { node_id, claimed_at } => {
                            self.release_claim(&node_id, claimed_at);
                        }

                        AlertCommand::DispatchFinished { node_id, delivered } => {
                            let node = self.nodes.entry(node_id).or_default();
                            node.attempts += 1;
                            node.last_delivered = Some(delivered);
                        }

                        AlertCommand::GetState { node_id, respond_to } => {
                            let _ = respond_to.send(self.snapshot(&node_id));
                        }

                        AlertCommand::ResetCooldown { node_id, respond_to } => {
                            let _ = respond_to.send(self.reset(&node_id));
                        }

                        AlertCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                // Command channel closed
                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("alert actor stopped");
    }

    /// Park, suppress, or claim the node and start a dispatch
    #[instrument(skip(self, event, respond_to), fields(node_id = %event.node_id))]
    fn handle_breakdown(&mut self, event: BreakdownEvent, respond_to: oneshot::Sender<AlertOutcome>) {
        let now = self.clock.now();
        let node = self.nodes.entry(event.node_id.clone()).or_default();

        if let Some(claim) = &mut node.pending {
            trace!(
                "claim from {} still pending, parking breakdown for {}",
                claim.claimed_at, event.node_id
            );
            claim.parked.push_back(ParkedEvent { event, respond_to });
            return;
        }

        let evaluation =
            CooldownEvaluation::evaluate(node.last_alert_sent_at, now, self.settings.cooldown);

        trace!(
            "cooldown evaluation: last sent {:?}, window {:?} → {evaluation:?}",
            node.last_alert_sent_at, self.settings.cooldown
        );

        match evaluation {
            CooldownEvaluation::CoolingDown { remaining } => {
                node.suppressed += 1;
                info!(
                    "alert for {} suppressed, cooling down for another {}s",
                    event.node_id,
                    remaining.as_secs()
                );
                let _ = respond_to.send(AlertOutcome::Suppressed { remaining });
            }

            CooldownEvaluation::Ready => {
                node.pending = Some(PendingClaim {
                    claimed_at: now,
                    parked: VecDeque::new(),
                });
                self.start_dispatch(event, respond_to, now);
            }
        }
    }

    fn start_dispatch(
        &self,
        event: BreakdownEvent,
        respond_to: oneshot::Sender<AlertOutcome>,
        claimed_at: DateTime<Utc>,
    ) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let self_tx = self.self_tx.clone();

        tokio::spawn(async move {
            let node_id = event.node_id.clone();

            // every follow-up reaches the actor before the caller gets its
            // reply, so callers that act on the reply see the updated state
            let outcome = match dispatcher.lookup(&event).await {
                Err(outcome) => {
                    report_back(&self_tx, AlertCommand::ReleaseClaim { node_id, claimed_at }).await;
                    outcome
                }
                Ok(authorities) => {
                    report_back(
                        &self_tx,
                        AlertCommand::ClaimConfirmed {
                            node_id: node_id.clone(),
                            claimed_at,
                        },
                    )
                    .await;

                    let report = dispatcher.fan_out(&event, &authorities, claimed_at).await;
                    report_back(
                        &self_tx,
                        AlertCommand::DispatchFinished {
                            node_id,
                            delivered: report.delivered(),
                        },
                    )
                    .await;
                    AlertOutcome::Dispatched(report)
                }
            };

            let _ = respond_to.send(outcome);
        });
    }

    /// The claimed attempt reaches the notifiers: start the cooldown and
    /// answer the parked events against it
    fn confirm_claim(&mut self, node_id: &str, claimed_at: DateTime<Utc>) {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        let Some(claim) = node.pending.take_if(|c| c.claimed_at == claimed_at) else {
            return;
        };

        node.last_alert_sent_at = Some(claimed_at);
        trace!(
            "claim for {node_id} confirmed, {} parked events",
            claim.parked.len()
        );

        for parked in claim.parked {
            self.handle_breakdown(parked.event, parked.respond_to);
        }
    }

    /// The claimed attempt never reached a notifier: the node is ready again
    /// and parked events get their own evaluation, oldest first
    fn release_claim(&mut self, node_id: &str, claimed_at: DateTime<Utc>) {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        let Some(claim) = node.pending.take_if(|c| c.claimed_at == claimed_at) else {
            return;
        };

        trace!(
            "releasing cooldown claim for {node_id}, {} parked events",
            claim.parked.len()
        );
        if node.is_blank() {
            self.nodes.remove(node_id);
        }

        // the first parked event claims again, the rest park behind it
        for parked in claim.parked {
            self.handle_breakdown(parked.event, parked.respond_to);
        }
    }

    /// Forget the node's cooldown; `true` if one was active
    ///
    /// A pending claim is left to resolve; if it confirms, its attempt
    /// starts a fresh cooldown.
    fn reset(&mut self, node_id: &str) -> bool {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return false;
        };

        let was_active = node.last_alert_sent_at.take().is_some();
        if node.pending.is_none() {
            self.nodes.remove(node_id);
        }

        debug!("cooldown for {node_id} reset (was active: {was_active})");
        was_active
    }

    fn snapshot(&self, node_id: &str) -> Option<CooldownSnapshot> {
        let node = self.nodes.get(node_id)?;

        let (phase, remaining_secs) = if node.pending.is_some() {
            (CooldownPhase::Pending, None)
        } else {
            let evaluation = CooldownEvaluation::evaluate(
                node.last_alert_sent_at,
                self.clock.now(),
                self.settings.cooldown,
            );
            let remaining_secs = match evaluation {
                CooldownEvaluation::Ready => None,
                CooldownEvaluation::CoolingDown { remaining } => {
                    Some(remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0))
                }
            };
            (CooldownPhase::from(evaluation), remaining_secs)
        };

        Some(CooldownSnapshot {
            node_id: node_id.to_string(),
            phase,
            last_alert_sent_at: node.last_alert_sent_at,
            remaining_secs,
            attempts: node.attempts,
            suppressed: node.suppressed,
            last_delivered: node.last_delivered,
        })
    }
}

/// Handle for controlling the AlertActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    /// Spawn a new alert actor
    ///
    /// # Arguments
    /// - `store`: Source of the authorities for a node
    /// - `email`, `sms`: Notification channels
    /// - `settings`: Cooldown window and per-channel timeout
    /// - `clock`: Time source for the cooldown evaluation
    pub fn spawn(
        store: Arc<dyn Store>,
        email: Arc<dyn EmailNotifier>,
        sms: Arc<dyn SmsNotifier>,
        settings: AlertSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = AlertActor {
            nodes: HashMap::new(),
            command_rx: cmd_rx,
            self_tx: cmd_tx.downgrade(),
            dispatcher: Arc::new(Dispatcher {
                store,
                email,
                sms,
                channel_timeout: settings.channel_timeout,
            }),
            settings,
            clock,
        };

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Hand a recorded breakdown to the coordinator and wait for the outcome
    pub async fn notify(&self, event: BreakdownEvent) -> AlertOutcome {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(AlertCommand::Breakdown {
                event,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return AlertOutcome::Unavailable;
        }

        rx.await.unwrap_or(AlertOutcome::Unavailable)
    }

    /// Get the cooldown state for a node
    pub async fn get_state(&self, node_id: impl Into<String>) -> Option<CooldownSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertCommand::GetState {
                node_id: node_id.into(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Reset the cooldown of a node; `true` if one was active
    pub async fn reset_cooldown(&self, node_id: impl Into<String>) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(AlertCommand::ResetCooldown {
                node_id: node_id.into(),
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Shutdown the alert actor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(AlertCommand::Shutdown).await;
    }
}
