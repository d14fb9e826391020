//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Telemetry posted over HTTP is reconciled like MQTT telemetry
//! - Read endpoints return current state, history, breakdowns and authorities
//! - Cooldown inspection and reset work through the alert actor
//! - Relay commands reach the publisher
//! - WebSocket clients receive new breakdowns
//! - Errors map to the right status codes

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use futures::StreamExt;
use powerline_monitoring::{
    RelayCommand, RelayState,
    actors::{AlertSettings, PipelineSettings},
    api::{ApiState, spawn_api_server},
    config::ApiSettings,
    notifiers::NEW_BREAKDOWN,
    transport::CommandPublisher,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::helpers::*;

/// Publisher that keeps every command it was asked to send
#[derive(Default)]
struct RecordingPublisher {
    commands: Mutex<Vec<RelayCommand>>,
}

#[async_trait]
impl CommandPublisher for RecordingPublisher {
    async fn publish(&self, command: &RelayCommand) -> anyhow::Result<()> {
        self.commands.lock().unwrap().push(command.clone());
        Ok(())
    }
}

// Helper to create test API server
async fn spawn_test_api(
    harness: &Harness,
    publisher: Option<Arc<dyn CommandPublisher>>,
) -> SocketAddr {
    let state = ApiState::new(
        harness.store.clone(),
        &harness.pipeline,
        harness.realtime.clone(),
        publisher,
    );

    let settings = ApiSettings {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        enable_cors: true,
    };

    spawn_api_server(settings, state).await.unwrap()
}

fn sample_json(node_id: &str, current: f64, timestamp: &str) -> Value {
    json!({
        "node_id": node_id,
        "current": current,
        "voltage_present": current > 0.0,
        "relay_status": "ON",
        "gps": { "lat": 10.85, "lon": 76.27 },
        "timestamp": timestamp,
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = Harness::new(vec![]);
    let addr = spawn_test_api(&harness, None).await;

    let response = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["healthy"], true);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_ingest_and_list_current() {
    let harness = Harness::new(vec![]);
    let addr = spawn_test_api(&harness, None).await;
    let client = reqwest::Client::new();

    for (current, timestamp) in [(4.2, "2025-03-01T10:00:00Z"), (3.9, "2025-03-01T10:00:05Z")] {
        let response = client
            .post(format!("http://{addr}/api/data"))
            .json(&sample_json("N1", current, timestamp))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["node_id"], "N1");
        assert_eq!(body["history_recorded"], true);
    }

    let current: Vec<Value> = client
        .get(format!("http://{addr}/api/data"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0]["node_id"], "N1");
    assert_eq!(current[0]["current"], 3.9);
    assert_eq!(current[0]["relay_status"], "ON");

    let history: Vec<Value> = client
        .get(format!("http://{addr}/api/data/history/N1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let currents: Vec<f64> = history
        .iter()
        .map(|p| p["current"].as_f64().unwrap())
        .collect();
    assert_eq!(currents, vec![4.2, 3.9]);

    let latest: Vec<Value> = client
        .get(format!("http://{addr}/api/data/history/N1?limit=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0]["current"], 3.9);
}

#[tokio::test]
async fn test_ingest_rejects_blank_node_id() {
    let harness = Harness::new(vec![]);
    let addr = spawn_test_api(&harness, None).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/data"))
        .json(&sample_json("   ", 1.0, "2025-03-01T10:00:00Z"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    let current: Vec<Value> = reqwest::get(format!("http://{addr}/api/data"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(current.is_empty());
}

#[tokio::test]
async fn test_ingest_stale_sample_conflict() {
    let harness = Harness::build(
        FlakyStore::default(),
        RecordingEmail::default(),
        PipelineSettings {
            alerts: AlertSettings {
                cooldown: COOLDOWN,
                channel_timeout: Duration::from_secs(1),
            },
            reject_stale: true,
            ..PipelineSettings::default()
        },
    );
    let addr = spawn_test_api(&harness, None).await;
    let client = reqwest::Client::new();

    let fresh = client
        .post(format!("http://{addr}/api/data"))
        .json(&sample_json("N1", 4.2, "2025-03-01T10:00:05Z"))
        .send()
        .await
        .unwrap();
    assert_eq!(fresh.status(), StatusCode::CREATED);

    let stale = client
        .post(format!("http://{addr}/api/data"))
        .json(&sample_json("N1", 1.0, "2025-03-01T10:00:00Z"))
        .send()
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_breakdown_visible_through_alerts_and_cooldown() {
    let harness = Harness::new(n2_authorities());
    let addr = spawn_test_api(&harness, None).await;
    let client = reqwest::Client::new();

    let missing = client
        .get(format!("http://{addr}/api/nodes/N2/cooldown"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    harness
        .pipeline
        .recorder
        .record(breakdown("N2", "Line down near pole 14"))
        .await
        .unwrap();

    let alerts: Vec<Value> = client
        .get(format!("http://{addr}/api/alerts?node_id=N2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["node_id"], "N2");
    assert_eq!(alerts[0]["breakdown_message"], "Line down near pole 14");

    let cooldown: Value = client
        .get(format!("http://{addr}/api/nodes/N2/cooldown"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cooldown["phase"], "COOLING_DOWN");
    assert_eq!(cooldown["remaining_secs"], 300);
    assert_eq!(cooldown["attempts"], 1);

    harness.clock.advance(Duration::from_secs(60));
    let cooldown: Value = client
        .get(format!("http://{addr}/api/nodes/N2/cooldown"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cooldown["remaining_secs"], 240);

    let reset: Value = client
        .delete(format!("http://{addr}/api/nodes/N2/cooldown"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset, json!({"node_id": "N2", "reset": true}));

    let after = client
        .get(format!("http://{addr}/api/nodes/N2/cooldown"))
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cooldown_not_found_after_breakdown_without_authorities() {
    let harness = Harness::new(n2_authorities());
    let addr = spawn_test_api(&harness, None).await;

    harness
        .pipeline
        .recorder
        .record(breakdown("N9", "Unmapped pole"))
        .await
        .unwrap();

    let response = reqwest::get(format!("http://{addr}/api/nodes/N9/cooldown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let harness = Harness::new(n2_authorities());
    let addr = spawn_test_api(&harness, None).await;

    harness
        .pipeline
        .reconciler
        .reconcile(sample("N1", 4.2, RelayState::On, 0))
        .await
        .unwrap();
    harness
        .pipeline
        .recorder
        .record(breakdown("N2", "Conductor snapped"))
        .await
        .unwrap();

    let stats: Value = reqwest::get(format!("http://{addr}/api/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["nodes_reporting"], 1);
    assert_eq!(stats["breakdowns_recorded"], 1);
    assert_eq!(stats["stream_subscribers"], 0);
}

#[tokio::test]
async fn test_authorities_endpoint() {
    let harness = Harness::new(n2_authorities());
    let addr = spawn_test_api(&harness, None).await;

    let authorities: Vec<Value> = reqwest::get(format!("http://{addr}/api/nodes/N2/authorities"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let emails: Vec<&str> = authorities
        .iter()
        .map(|a| a["contact_email"].as_str().unwrap())
        .collect();
    assert_eq!(emails, vec!["a1@example.org", "a2@example.org"]);

    let none: Vec<Value> = reqwest::get(format!("http://{addr}/api/nodes/N9/authorities"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_commands_without_broker() {
    let harness = Harness::new(vec![]);
    let addr = spawn_test_api(&harness, None).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/commands"))
        .json(&json!({"outNodeId": "N1", "inNodeId": "N2", "status": "OFF"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_commands_published() {
    let harness = Harness::new(vec![]);
    let publisher = Arc::new(RecordingPublisher::default());
    let addr = spawn_test_api(&harness, Some(publisher.clone())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/commands"))
        .json(&json!({"outNodeId": " N1 ", "inNodeId": "N2", "status": "OFF"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "sent");
    assert_eq!(body["command"]["outNodeId"], "N1");

    let missing = client
        .post(format!("http://{addr}/api/commands"))
        .json(&json!({"outNodeId": "", "inNodeId": "N2", "status": "ON"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let sent = publisher.commands.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![RelayCommand {
            out_node_id: "N1".to_string(),
            in_node_id: "N2".to_string(),
            status: RelayState::Off,
        }]
    );
}

#[tokio::test]
async fn test_websocket_streams_new_breakdowns() {
    let harness = Harness::new(n2_authorities());
    let addr = spawn_test_api(&harness, None).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/api/stream"))
        .await
        .unwrap();

    // The subscription is taken after the upgrade completes
    for _ in 0..50 {
        if harness.realtime.subscriber_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(harness.realtime.subscriber_count(), 1);

    harness
        .pipeline
        .recorder
        .record(breakdown("N2", "Line down near pole 14"))
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = match message {
        Message::Text(text) => text,
        other => panic!("expected a text frame, got {other:?}"),
    };

    let payload: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(payload["event"], NEW_BREAKDOWN);
    assert_eq!(payload["data"]["node_id"], "N2");
    assert_eq!(payload["data"]["breakdown_message"], "Line down near pole 14");
    assert!(payload["data"]["id"].is_i64());
}
