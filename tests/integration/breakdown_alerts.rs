//! Integration tests for breakdown recording and alert fanout
//!
//! These tests verify that:
//! - Every breakdown is recorded, even while alerts are suppressed
//! - The cooldown window gates dispatch per node
//! - Nodes without authorities are recorded but never notified
//! - A failed persist aborts broadcast and alerting
//! - Breakdowns arriving while a lookup runs wait for its outcome

use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use powerline_monitoring::{
    actors::AlertOutcome,
    cooldown::CooldownPhase,
    error::PipelineError,
    notifiers::NotifierError,
    storage::Store,
};
use tokio::sync::broadcast::error::TryRecvError;

use crate::helpers::*;

#[tokio::test]
async fn test_n2_second_breakdown_within_window_is_recorded_not_sent() {
    let harness = Harness::new(n2_authorities());
    let recorder = &harness.pipeline.recorder;

    let first = recorder.record(breakdown("N2", "Conductor snapped")).await.unwrap();
    let AlertOutcome::Dispatched(report) = &first.alert else {
        panic!("expected dispatch, got {:?}", first.alert);
    };
    assert!(report.delivered());
    assert_eq!(report.sms_sent(), 2);

    // one batched email to both authorities, one SMS per number
    assert_eq!(
        harness.email.recipients(),
        vec![vec![
            "a1@example.org".to_string(),
            "a2@example.org".to_string()
        ]]
    );
    assert_eq!(
        harness.sms.numbers(),
        vec![vec![
            "+919876543210".to_string(),
            "+919876543211".to_string()
        ]]
    );

    let state = harness.pipeline.alerts.get_state("N2").await.unwrap();
    assert_eq!(state.phase, CooldownPhase::CoolingDown);
    assert_eq!(state.last_alert_sent_at, Some(t0()));

    harness.clock.advance(Duration::from_secs(60));
    let second = recorder.record(breakdown("N2", "Still down")).await.unwrap();

    assert_eq!(
        second.alert,
        AlertOutcome::Suppressed {
            remaining: Duration::from_secs(240)
        }
    );
    assert!(second.recorded.id > first.recorded.id);
    assert_eq!(harness.store.count_breakdowns().await.unwrap(), 2);
    assert_eq!(harness.email.call_count(), 1);
    assert_eq!(harness.sms.call_count(), 1);
}

#[tokio::test]
async fn test_cooldown_boundary() {
    let harness = Harness::new(n2_authorities());
    let recorder = &harness.pipeline.recorder;

    assert!(recorder.record(breakdown("N2", "t0")).await.unwrap().alert.is_dispatched());

    harness.clock.advance(COOLDOWN - Duration::from_secs(1));
    let outcome = recorder.record(breakdown("N2", "t0+W-1")).await.unwrap();
    assert_eq!(
        outcome.alert,
        AlertOutcome::Suppressed {
            remaining: Duration::from_secs(1)
        }
    );

    harness.clock.advance(Duration::from_secs(1));
    let outcome = recorder.record(breakdown("N2", "t0+W")).await.unwrap();
    assert!(outcome.alert.is_dispatched());

    let state = harness.pipeline.alerts.get_state("N2").await.unwrap();
    assert_eq!(state.last_alert_sent_at, Some(at(COOLDOWN.as_secs() as i64)));
    assert_eq!(state.attempts, 2);
    assert_eq!(state.suppressed, 1);
    assert_eq!(harness.email.call_count(), 2);
}

#[tokio::test]
async fn test_cooldown_is_per_node() {
    let mut authorities = n2_authorities();
    authorities.push(authority("B1", "N3", "b1@example.org", "+919876543212"));
    let harness = Harness::new(authorities);
    let recorder = &harness.pipeline.recorder;

    assert!(recorder.record(breakdown("N2", "down")).await.unwrap().alert.is_dispatched());
    assert!(recorder.record(breakdown("N3", "down")).await.unwrap().alert.is_dispatched());
    assert_eq!(harness.email.call_count(), 2);
}

#[tokio::test]
async fn test_no_authorities_records_without_notifying() {
    let harness = Harness::new(n2_authorities());

    let outcome = harness
        .pipeline
        .recorder
        .record(breakdown("N9", "Unmapped pole"))
        .await
        .unwrap();

    assert_eq!(outcome.alert, AlertOutcome::NoAuthorities);
    assert_eq!(harness.store.count_breakdowns().await.unwrap(), 1);
    assert_eq!(harness.email.call_count(), 0);
    assert_eq!(harness.sms.call_count(), 0);

    // the claim was released and nothing was ever attempted for the node
    assert!(harness.pipeline.alerts.get_state("N9").await.is_none());
}

#[tokio::test]
async fn test_persist_failure_aborts_broadcast_and_alert() {
    let harness = Harness::new(n2_authorities());
    let mut stream = harness.realtime.subscribe();
    harness.store.fail_breakdowns.store(true, Ordering::SeqCst);

    let result = harness
        .pipeline
        .recorder
        .record(breakdown("N2", "Lost"))
        .await;

    assert_matches!(result, Err(PipelineError::Store(_)));
    assert_matches!(stream.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(harness.email.call_count(), 0);
    assert!(harness.pipeline.alerts.get_state("N2").await.is_none());
}

#[tokio::test]
async fn test_blank_node_id_is_not_recorded() {
    let harness = Harness::new(n2_authorities());

    let result = harness.pipeline.recorder.record(breakdown("  ", "?")).await;

    assert_matches!(result, Err(PipelineError::Validation(_)));
    assert_eq!(harness.store.count_breakdowns().await.unwrap(), 0);
}

#[tokio::test]
async fn test_email_failure_still_starts_cooldown() {
    let harness = Harness::with_email(n2_authorities(), RecordingEmail::failing());
    let recorder = &harness.pipeline.recorder;

    let outcome = recorder.record(breakdown("N2", "down")).await.unwrap();
    let AlertOutcome::Dispatched(report) = outcome.alert else {
        panic!("expected dispatch");
    };
    assert!(!report.delivered());
    assert_matches!(report.email, Err(NotifierError::Rejected { status: 502, .. }));
    // SMS went out regardless of the email failure
    assert_eq!(report.sms_sent(), 2);

    let state = harness.pipeline.alerts.get_state("N2").await.unwrap();
    assert_eq!(state.phase, CooldownPhase::CoolingDown);
    assert_eq!(state.last_delivered, Some(false));

    let outcome = recorder.record(breakdown("N2", "again")).await.unwrap();
    assert_matches!(outcome.alert, AlertOutcome::Suppressed { .. });
    assert_eq!(harness.email.call_count(), 1);
}

#[tokio::test]
async fn test_authority_lookup_failure_releases_claim() {
    let harness = Harness::new(n2_authorities());
    let recorder = &harness.pipeline.recorder;

    harness.store.fail_authorities.store(true, Ordering::SeqCst);
    let outcome = recorder.record(breakdown("N2", "down")).await.unwrap();
    assert_matches!(outcome.alert, AlertOutcome::LookupFailed(_));

    harness.store.fail_authorities.store(false, Ordering::SeqCst);
    let outcome = recorder.record(breakdown("N2", "down")).await.unwrap();
    assert!(outcome.alert.is_dispatched());
    assert_eq!(harness.email.call_count(), 1);
}

#[tokio::test]
async fn test_recorded_breakdown_is_broadcast() {
    let harness = Harness::new(vec![]);
    let mut stream = harness.realtime.subscribe();

    let outcome = harness
        .pipeline
        .recorder
        .record(breakdown("N4", "Insulator flashover"))
        .await
        .unwrap();

    assert_eq!(outcome.broadcast, Ok(1));
    let message = stream.recv().await.unwrap();
    assert_eq!(message.event, "new-breakdown");
    assert_eq!(message.data.id, outcome.recorded.id);
    assert_eq!(message.data.event.message, "Insulator flashover");
}

#[tokio::test]
async fn test_operator_reset_allows_immediate_dispatch() {
    let harness = Harness::new(n2_authorities());
    let recorder = &harness.pipeline.recorder;

    recorder.record(breakdown("N2", "down")).await.unwrap();
    assert!(harness.pipeline.alerts.reset_cooldown("N2").await);

    let outcome = recorder.record(breakdown("N2", "down")).await.unwrap();
    assert!(outcome.alert.is_dispatched());
    assert_eq!(harness.email.call_count(), 2);
}

#[tokio::test]
async fn test_breakdown_during_failed_lookup_is_dispatched() {
    let harness = Harness::new(n2_authorities());
    harness.store.fail_next_authorities.store(true, Ordering::SeqCst);
    harness.store.authorities_delay_ms.store(100, Ordering::SeqCst);

    let alerts = harness.pipeline.alerts.clone();
    let first = tokio::spawn(async move { alerts.notify(breakdown("N2", "first")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let state = harness.pipeline.alerts.get_state("N2").await.unwrap();
    assert_eq!(state.phase, CooldownPhase::Pending);
    assert_eq!(state.remaining_secs, None);

    // waits behind the first claim, then gets its own lookup
    let second = harness.pipeline.alerts.notify(breakdown("N2", "second")).await;

    assert_matches!(first.await.unwrap(), AlertOutcome::LookupFailed(_));
    assert!(second.is_dispatched());
    assert_eq!(harness.email.call_count(), 1);

    let state = harness.pipeline.alerts.get_state("N2").await.unwrap();
    assert_eq!(state.phase, CooldownPhase::CoolingDown);
    assert_eq!(state.attempts, 1);
    assert_eq!(state.suppressed, 0);
}

#[tokio::test]
async fn test_breakdown_during_lookup_is_suppressed_against_the_attempt() {
    let harness = Harness::new(n2_authorities());
    harness.store.authorities_delay_ms.store(100, Ordering::SeqCst);

    let alerts = harness.pipeline.alerts.clone();
    let first = tokio::spawn(async move { alerts.notify(breakdown("N2", "first")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    harness.clock.advance(Duration::from_secs(60));
    let second = harness.pipeline.alerts.notify(breakdown("N2", "second")).await;

    assert!(first.await.unwrap().is_dispatched());
    assert_eq!(
        second,
        AlertOutcome::Suppressed {
            remaining: Duration::from_secs(240)
        }
    );
    assert_eq!(harness.email.call_count(), 1);

    let state = harness.pipeline.alerts.get_state("N2").await.unwrap();
    assert_eq!(state.last_alert_sent_at, Some(t0()));
    assert_eq!(state.suppressed, 1);
}

#[tokio::test]
async fn test_parked_breakdowns_of_released_claim_dispatch_once() {
    let harness = Harness::new(n2_authorities());
    harness.store.fail_next_authorities.store(true, Ordering::SeqCst);
    harness.store.authorities_delay_ms.store(50, Ordering::SeqCst);

    let alerts = harness.pipeline.alerts.clone();
    let first = tokio::spawn(async move { alerts.notify(breakdown("N2", "first")).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let parked: Vec<_> = (0..3)
        .map(|i| {
            let alerts = harness.pipeline.alerts.clone();
            tokio::spawn(async move { alerts.notify(breakdown("N2", &format!("parked {i}"))).await })
        })
        .collect();

    assert_matches!(first.await.unwrap(), AlertOutcome::LookupFailed(_));

    let mut outcomes = Vec::new();
    for handle in parked {
        outcomes.push(handle.await.unwrap());
    }
    let dispatched = outcomes.iter().filter(|o| o.is_dispatched()).count();
    let suppressed = outcomes
        .iter()
        .filter(|o| matches!(o, AlertOutcome::Suppressed { .. }))
        .count();

    assert_eq!((dispatched, suppressed), (1, 2));
    assert_eq!(harness.email.call_count(), 1);
}
