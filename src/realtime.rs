// src/realtime.rs
//
// Best-effort side channel: vehicle events are POSTed to a configured webhook
// for the realtime layer to fan out over websockets. The call is
// fire-and-forget by contract: a publish failure is logged and never
// propagated to the submitter.

use chrono::Utc;
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleEvent {
    pub vehicle_id: i64,
    #[serde(rename = "type")]
    pub event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by_user_id: Option<i64>,
    pub timestamp: String,
}

impl VehicleEvent {
    pub fn refresh(vehicle_id: i64, triggered_by_user_id: Option<i64>) -> Self {
        Self::new(vehicle_id, "refresh", None, None, triggered_by_user_id)
    }

    pub fn new(
        vehicle_id: i64,
        event_type: &'static str,
        previous_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
        triggered_by_user_id: Option<i64>,
    ) -> Self {
        Self {
            vehicle_id,
            event_type,
            previous_value,
            new_value,
            triggered_by_user_id,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct EventPublisher {
    endpoint: Option<String>,
    client: Client,
}

impl EventPublisher {
    pub fn new(endpoint: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("publisher client");
        Self { endpoint, client }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("REALTIME_WEBHOOK_URL").ok())
    }

    /// Publishes on a detached thread so a slow webhook never holds up the
    /// ingestion response.
    pub fn publish(&self, event: VehicleEvent) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        let client = self.client.clone();

        std::thread::spawn(move || {
            match client.post(&endpoint).json(&event).send() {
                Ok(resp) if !resp.status().is_success() => {
                    eprintln!(
                        "⚠️ Realtime publish for vehicle {} got {}",
                        event.vehicle_id,
                        resp.status()
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!(
                        "⚠️ Realtime publish for vehicle {} failed: {e}",
                        event.vehicle_id
                    );
                }
            }
        });
    }
}
