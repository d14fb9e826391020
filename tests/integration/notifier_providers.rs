//! Integration tests for the HTTP notifier providers
//!
//! These tests verify that:
//! - The mail relay receives one batched message with bearer auth
//! - Twilio receives one form POST per valid number
//! - Provider errors are reported per channel and per recipient
//! - The whole alert path works against real provider clients

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use powerline_monitoring::{
    actors::{AlertOutcome, AlertSettings, Notifiers, Pipeline, PipelineSettings},
    config::{EmailConfig, SmsConfig},
    cooldown::ManualClock,
    notifiers::{
        EmailNotifier, HttpMailer, NotifierError, RealtimeHub, SmsNotifier, TwilioSms,
    },
    storage::MemoryStore,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

const MESSAGES_PATH: &str = "/2010-04-01/Accounts/AC123/Messages.json";

fn mailer(server: &MockServer, token: Option<&str>) -> HttpMailer {
    HttpMailer::new(EmailConfig {
        url: format!("{}/send", server.uri()),
        from: "alerts@powerline.example".to_string(),
        token: token.map(str::to_string),
    })
}

fn twilio(server: &MockServer) -> TwilioSms {
    TwilioSms::new(SmsConfig {
        account_sid: "AC123".to_string(),
        from_number: "+15550001111".to_string(),
        auth_token: Some("secret".to_string()),
        base_url: server.uri(),
    })
}

#[tokio::test]
async fn test_mail_relay_receives_batched_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer relay-token"))
        .and(body_partial_json(json!({
            "from": "alerts@powerline.example",
            "to": ["a1@example.org", "a2@example.org"],
            "subject": "🚨 BREAKDOWN ALERT - Node N2",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let recipients = vec!["a1@example.org".to_string(), "a2@example.org".to_string()];
    let result = mailer(&server, Some("relay-token"))
        .send(&recipients, &breakdown("N2", "Conductor snapped"))
        .await;

    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_mail_relay_error_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(500).set_body_string("mailbox full"))
        .mount(&server)
        .await;

    let result = mailer(&server, None)
        .send(&["a1@example.org".to_string()], &breakdown("N2", "down"))
        .await;

    assert_eq!(
        result,
        Err(NotifierError::Rejected {
            status: 500,
            body: "mailbox full".to_string()
        })
    );
}

#[tokio::test]
async fn test_twilio_results_are_per_recipient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(body_string_contains("To=%2B919876543210"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM42"})))
        .expect(1)
        .mount(&server)
        .await;

    let recipients = vec!["9876543210".to_string(), "12345".to_string()];
    let deliveries = twilio(&server)
        .send(&recipients, &breakdown("N2", "down"))
        .await;

    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[0].number, "9876543210");
    assert_eq!(deliveries[0].result, Ok("SM42".to_string()));
    assert_eq!(
        deliveries[1].result,
        Err(NotifierError::InvalidRecipient("12345".to_string()))
    );
}

#[tokio::test]
async fn test_twilio_error_status_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"code": 21211, "message": "invalid To"})),
        )
        .mount(&server)
        .await;

    let result = twilio(&server).send_single("+919876543210", "hello").await;
    assert_matches!(result, Err(NotifierError::Rejected { status: 400, .. }));
}

#[tokio::test]
async fn test_twilio_test_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .and(body_string_contains("Test+SMS"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SMtest"})))
        .expect(1)
        .mount(&server)
        .await;

    let sid = twilio(&server).send_test("+919876543210").await.unwrap();
    assert_eq!(sid, "SMtest");
}

#[tokio::test]
async fn test_breakdown_alert_through_real_providers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM1"})))
        .expect(2)
        .mount(&server)
        .await;

    let realtime = RealtimeHub::default();
    let pipeline = Pipeline::spawn(
        Arc::new(MemoryStore::with_authorities(n2_authorities())),
        Notifiers {
            email: Arc::new(mailer(&server, None)),
            sms: Arc::new(twilio(&server)),
            realtime: Arc::new(realtime),
        },
        PipelineSettings {
            alerts: AlertSettings {
                cooldown: COOLDOWN,
                channel_timeout: Duration::from_secs(5),
            },
            ..PipelineSettings::default()
        },
        Arc::new(ManualClock::new(t0())),
    );

    let outcome = pipeline
        .recorder
        .record(breakdown("N2", "Conductor snapped"))
        .await
        .unwrap();

    let AlertOutcome::Dispatched(report) = outcome.alert else {
        panic!("expected dispatch, got {:?}", outcome.alert);
    };
    assert!(report.delivered());
    assert_eq!(report.sms_sent(), 2);
}

#[tokio::test]
async fn test_slow_mail_relay_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MESSAGES_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM1"})))
        .mount(&server)
        .await;

    let pipeline = Pipeline::spawn(
        Arc::new(MemoryStore::with_authorities(n2_authorities())),
        Notifiers {
            email: Arc::new(mailer(&server, None)),
            sms: Arc::new(twilio(&server)),
            realtime: Arc::new(RealtimeHub::default()),
        },
        PipelineSettings {
            alerts: AlertSettings {
                cooldown: COOLDOWN,
                channel_timeout: Duration::from_millis(200),
            },
            ..PipelineSettings::default()
        },
        Arc::new(ManualClock::new(t0())),
    );

    let outcome = pipeline.alerts.notify(breakdown("N2", "down")).await;
    let AlertOutcome::Dispatched(report) = outcome else {
        panic!("expected dispatch, got {outcome:?}");
    };

    assert_matches!(report.email, Err(NotifierError::Timeout { .. }));
    assert!(!report.delivered());
    assert_eq!(report.sms_sent(), 2);
}
