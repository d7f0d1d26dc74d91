//! Expo push gateway
//!
//! One POST per notification. High-priority messages go to the
//! `energy-alerts` Android channel, everything else to `energy-opportunities`.

use crate::core::{Error, NotificationPriority, PushConfig, Result};
use crate::scheduler::{DeliveryGateway, DeliveryReceipt, DeliveryRequest};
use reqwest::Client;
use serde_json::{json, Value};

const ALERTS_CHANNEL: &str = "energy-alerts";
const OPPORTUNITIES_CHANNEL: &str = "energy-opportunities";

/// Push delivery through the Expo HTTP API
#[derive(Debug, Clone)]
pub struct ExpoGateway {
    http: Client,
    endpoint: String,
}

impl ExpoGateway {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.endpoint.clone(),
        }
    }
}

impl DeliveryGateway for ExpoGateway {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&payload(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Delivery(format!("push gateway returned {}: {}", status, text)));
        }

        let body: Value = response.json().await?;
        parse_receipt(&body)
    }
}

fn payload(request: &DeliveryRequest) -> Value {
    let high = request.priority == NotificationPriority::High;
    json!({
        "to": request.to,
        "title": request.title,
        "body": request.body,
        "sound": "default",
        "priority": if high { "high" } else { "default" },
        "channelId": if high { ALERTS_CHANNEL } else { OPPORTUNITIES_CHANNEL },
        "data": {
            "type": request.kind.as_str(),
            "applianceKey": request.appliance_key,
            "deviceName": request.device_name,
            "priority": request.priority.as_str(),
            "historyId": request.history_id,
        },
    })
}

/// Extract the ticket id; a ticket with `status: "error"` is a failed delivery
fn parse_receipt(body: &Value) -> Result<DeliveryReceipt> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if let Some(first) = errors.first() {
            let message = first.get("message").and_then(Value::as_str).unwrap_or("unknown error");
            return Err(Error::Delivery(message.to_string()));
        }
    }

    // A single message yields an object, a batch yields an array
    let ticket = match body.get("data") {
        Some(Value::Array(tickets)) => tickets.first(),
        Some(ticket) => Some(ticket),
        None => None,
    };
    let Some(ticket) = ticket else {
        return Ok(DeliveryReceipt::default());
    };

    if ticket.get("status").and_then(Value::as_str) == Some("error") {
        let message = ticket.get("message").and_then(Value::as_str).unwrap_or("rejected");
        return Err(Error::Delivery(message.to_string()));
    }

    Ok(DeliveryReceipt {
        id: ticket.get("id").and_then(Value::as_str).map(str::to_string),
    })
}
