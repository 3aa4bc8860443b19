//! Mercado Pago payment webhook.
//!
//! The processor retries deliveries that do not return 2xx, and sends both
//! GET (topic/id in the query) and POST (type/data.id in a JSON body)
//! variants. The handler therefore parses everything leniently and always
//! acknowledges with `200 {"received": true}`; reconciliation decides what,
//! if anything, to do.

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::{services::reconciliation::PaymentNotification, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
    pub provider_id: Option<String>,
    pub order_id: Option<String>,
}

fn parse_uuid(label: &str, raw: Option<&String>) -> Option<Uuid> {
    let raw = raw?;
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(%label, value = %raw, "webhook parameter is not a valid uuid");
            None
        }
    }
}

pub async fn webhook_get(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
) -> Json<Value> {
    let notification = PaymentNotification {
        topic: query.topic.clone().or(query.notification_type.clone()),
        payment_id: query.id.clone().or(query.data_id.clone()),
        provider_id: parse_uuid("provider_id", query.provider_id.as_ref()),
        order_id: parse_uuid("order_id", query.order_id.as_ref()),
    };

    state
        .services
        .reconciliation
        .handle_notification(notification)
        .await;

    Json(json!({ "received": true }))
}

pub async fn webhook_post(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Json<Value> {
    let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let body_type = parsed
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);
    let body_payment_id = parsed.get("data").and_then(|d| d.get("id")).and_then(|id| {
        // The processor sends the id either as a string or a number.
        id.as_str()
            .map(str::to_string)
            .or_else(|| id.as_i64().map(|n| n.to_string()))
    });

    let notification = PaymentNotification {
        topic: body_type
            .or(query.notification_type.clone())
            .or(query.topic.clone()),
        payment_id: body_payment_id
            .or(query.data_id.clone())
            .or(query.id.clone()),
        provider_id: parse_uuid("provider_id", query.provider_id.as_ref()),
        order_id: parse_uuid("order_id", query.order_id.as_ref()),
    };

    state
        .services
        .reconciliation
        .handle_notification(notification)
        .await;

    Json(json!({ "received": true }))
}
