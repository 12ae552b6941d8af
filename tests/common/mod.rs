#![allow(dead_code)]

pub mod strategies;

use chrono::{DateTime, TimeZone, Utc};
use sequencer_core::config::ShadowClientConfig;
use sequencer_core::shadow::{ShadowClient, ShadowError, TransportEvent};
use sequencer_core::test_helpers::{MockShadowConnection, RecordedCall};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub fn session_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 18, 30, 0).unwrap()
}

/// Shadow client running over a mock connection, driven by hand-fed
/// transport events
pub struct ShadowHarness {
    pub client: ShadowClient,
    pub connection: Arc<MockShadowConnection>,
    pub transport: mpsc::Sender<TransportEvent>,
    pub worker: JoinHandle<Result<(), ShadowError>>,
}

impl ShadowHarness {
    pub fn start(config: &ShadowClientConfig) -> Self {
        let connection = MockShadowConnection::new();
        let (transport, transport_events) = mpsc::channel(64);
        let (client, worker) = ShadowClient::spawn(config, connection.clone(), transport_events);
        Self {
            client,
            connection,
            transport,
            worker,
        }
    }

    pub async fn send(&self, event: TransportEvent) {
        self.transport.send(event).await.unwrap();
    }

    /// Wait for the `nth` call (1-based) and return it
    pub async fn call(&self, nth: usize) -> RecordedCall {
        self.connection.wait_for_calls(nth).await;
        self.connection.calls()[nth - 1].clone()
    }

    pub async fn accept(&self, call: &RecordedCall, shadow: Value) {
        self.respond(call, "accepted", shadow).await;
    }

    pub async fn reject(&self, call: &RecordedCall) {
        self.respond(call, "rejected", json!({"code": 400, "message": "rejected"}))
            .await;
    }

    async fn respond(&self, call: &RecordedCall, result: &str, shadow: Value) {
        let event = match call {
            RecordedCall::Register { token, .. } => TransportEvent::Registered {
                token: token.clone(),
                error: (result == "rejected").then(|| "not authorized".to_string()),
            },
            RecordedCall::Get { thing_name, token } | RecordedCall::Update { thing_name, token, .. } => {
                TransportEvent::Status {
                    thing_name: thing_name.clone(),
                    result: result.to_string(),
                    token: token.clone(),
                    shadow,
                }
            }
            other => panic!("{other:?} is never acknowledged"),
        };
        self.send(event).await;
    }
}
