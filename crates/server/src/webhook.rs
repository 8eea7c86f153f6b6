//! The webhook receiver.
//!
//! Each inbound request walks RECEIVED → PARSED → AUTHORIZED → PERSISTED →
//! PIPELINE_TRIGGERED → ACKNOWLEDGED, with a failure exit at any stage:
//! 400 for unparseable JSON, 422 with per-field errors for schema
//! violations, 401 for a foreign account, 500 (generic) for anything else.
use std::time::Duration;

use api_types::webhook::{FieldError, WebhookPayload};
use axum::{Json, body::Bytes, extract::State};
use engine::{WEBHOOK_PIPELINE, landing};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{ServerError, server::ServerState};

const TRIGGER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
pub struct Acknowledged {
    status: &'static str,
}

pub async fn receive_feed_item(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<Acknowledged>, ServerError> {
    // PARSED: reject non-JSON outright, then check the strict schema.
    let value: Value = serde_json::from_slice(&body)
        .map_err(|_| ServerError::BadRequest("no JSON payload provided".to_string()))?;

    let errors = validate(&value);
    if !errors.is_empty() {
        return Err(ServerError::Validation(errors));
    }
    let payload: WebhookPayload = serde_json::from_value(value).map_err(|err| {
        ServerError::Validation(vec![FieldError {
            field: "payload".to_string(),
            message: err.to_string(),
        }])
    })?;

    // AUTHORIZED: the payload must be for the configured account.
    if payload.content.account_uid != state.account_uid {
        tracing::error!(
            account_uid = %payload.content.account_uid,
            "webhook rejected: account uid does not match"
        );
        return Err(ServerError::Unauthorized);
    }

    // PERSISTED: durable before any trigger is attempted.
    landing::upsert_webhook_transaction(&state.warehouse, &payload).await?;

    // PIPELINE_TRIGGERED: fire-and-forget. The row is already durable, so a
    // trigger failure only delays the merge until the next scheduled run.
    if let Some(control) = state.control.clone() {
        tokio::spawn(async move {
            if let Err(err) = control
                .trigger_pipeline(WEBHOOK_PIPELINE, WEBHOOK_PIPELINE, TRIGGER_TIMEOUT)
                .await
            {
                tracing::error!(
                    error = %err,
                    "webhook pipeline trigger failed; merge waits for the scheduled run"
                );
            }
        });
    }

    tracing::info!(
        feed_item_uid = %payload.content.feed_item_uid,
        "webhook acknowledged"
    );
    Ok(Json(Acknowledged { status: "success" }))
}

fn missing(field: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: "required field is missing".to_string(),
    }
}

fn wrong_type(field: &str, expected: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: format!("expected {expected}"),
    }
}

/// Checks the strict core schema, collecting every failing field.
///
/// Unknown fields anywhere are fine (they end up in the payload's `extra`
/// maps); only missing or mistyped required fields are reported.
fn validate(value: &Value) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let Some(root) = value.as_object() else {
        return vec![wrong_type("payload", "a JSON object")];
    };

    check_string(root, "webhookEventUid", "", &mut errors);
    check_timestamp(root, "eventTimestamp", "", &mut errors);
    check_string(root, "accountHolderUid", "", &mut errors);

    match root.get("content") {
        None => errors.push(missing("content")),
        Some(Value::Object(content)) => {
            for field in [
                "feedItemUid",
                "categoryUid",
                "accountUid",
                "direction",
                "source",
                "status",
                "transactingApplicationUserUid",
                "counterPartyType",
                "counterPartyUid",
                "counterPartyName",
            ] {
                check_string(content, field, "content.", &mut errors);
            }
            for field in ["updatedAt", "transactionTime", "settlementTime"] {
                check_timestamp(content, field, "content.", &mut errors);
            }
            for field in ["hasAttachment", "receiptPresent"] {
                check_bool(content, field, "content.", &mut errors);
            }
            for field in ["amount", "sourceAmount"] {
                check_money(content, field, "content.", &mut errors);
            }
        }
        Some(_) => errors.push(wrong_type("content", "an object")),
    }

    errors
}

fn check_string(obj: &Map<String, Value>, name: &str, prefix: &str, errors: &mut Vec<FieldError>) {
    let path = format!("{prefix}{name}");
    match obj.get(name) {
        None | Some(Value::Null) => errors.push(missing(&path)),
        Some(Value::String(_)) => {}
        Some(_) => errors.push(wrong_type(&path, "a string")),
    }
}

fn check_timestamp(
    obj: &Map<String, Value>,
    name: &str,
    prefix: &str,
    errors: &mut Vec<FieldError>,
) {
    let path = format!("{prefix}{name}");
    match obj.get(name) {
        None | Some(Value::Null) => errors.push(missing(&path)),
        Some(Value::String(s)) => {
            if chrono::DateTime::parse_from_rfc3339(s).is_err() {
                errors.push(wrong_type(&path, "an RFC 3339 timestamp"));
            }
        }
        Some(_) => errors.push(wrong_type(&path, "an RFC 3339 timestamp")),
    }
}

fn check_bool(obj: &Map<String, Value>, name: &str, prefix: &str, errors: &mut Vec<FieldError>) {
    let path = format!("{prefix}{name}");
    match obj.get(name) {
        None | Some(Value::Null) => errors.push(missing(&path)),
        Some(Value::Bool(_)) => {}
        Some(_) => errors.push(wrong_type(&path, "a boolean")),
    }
}

fn check_money(obj: &Map<String, Value>, name: &str, prefix: &str, errors: &mut Vec<FieldError>) {
    let path = format!("{prefix}{name}");
    match obj.get(name) {
        None | Some(Value::Null) => errors.push(missing(&path)),
        Some(Value::Object(amount)) => {
            let sub_prefix = format!("{path}.");
            check_string(amount, "currency", &sub_prefix, errors);
            match amount.get("minorUnits") {
                None | Some(Value::Null) => errors.push(missing(&format!("{path}.minorUnits"))),
                Some(Value::Number(n)) if n.is_i64() => {}
                Some(_) => errors.push(wrong_type(&format!("{path}.minorUnits"), "an integer")),
            }
        }
        Some(_) => errors.push(wrong_type(&path, "an object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "webhookEventUid": "evt-1",
            "eventTimestamp": "2025-11-26T12:00:00Z",
            "accountHolderUid": "holder-1",
            "content": {
                "feedItemUid": "abc-1",
                "categoryUid": "cat-1",
                "accountUid": "acc-1",
                "amount": {"currency": "GBP", "minorUnits": 2599},
                "sourceAmount": {"currency": "GBP", "minorUnits": 2599},
                "direction": "OUT",
                "updatedAt": "2025-11-26T12:00:00Z",
                "transactionTime": "2025-11-26T12:00:00Z",
                "settlementTime": "2025-11-26T12:00:00Z",
                "source": "MASTER_CARD",
                "status": "SETTLED",
                "transactingApplicationUserUid": "user-1",
                "counterPartyType": "MERCHANT",
                "counterPartyUid": "merchant-1",
                "counterPartyName": "Test Store",
                "hasAttachment": false,
                "receiptPresent": false
            }
        })
    }

    #[test]
    fn valid_payload_has_no_errors() {
        assert!(validate(&valid_payload()).is_empty());
    }

    #[test]
    fn missing_feed_item_uid_is_reported_by_path() {
        let mut payload = valid_payload();
        payload["content"]
            .as_object_mut()
            .unwrap()
            .remove("feedItemUid");
        let errors = validate(&payload);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "content.feedItemUid");
    }

    #[test]
    fn every_failing_field_is_collected() {
        let mut payload = valid_payload();
        let content = payload["content"].as_object_mut().unwrap();
        content.remove("feedItemUid");
        content.insert("hasAttachment".to_string(), json!("nope"));
        content.insert("amount".to_string(), json!({"currency": "GBP"}));
        let errors = validate(&payload);
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"content.feedItemUid"));
        assert!(fields.contains(&"content.hasAttachment"));
        assert!(fields.contains(&"content.amount.minorUnits"));
    }

    #[test]
    fn extra_fields_are_not_errors() {
        let mut payload = valid_payload();
        payload["newStarlingField"] = json!("x");
        payload["content"]["anotherNewField"] = json!({"nested": true});
        assert!(validate(&payload).is_empty());
    }

    #[test]
    fn missing_content_does_not_cascade() {
        let payload = json!({
            "webhookEventUid": "evt-1",
            "eventTimestamp": "2025-11-26T12:00:00Z",
            "accountHolderUid": "holder-1"
        });
        let errors = validate(&payload);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "content");
    }

    #[test]
    fn malformed_timestamp_is_reported() {
        let mut payload = valid_payload();
        payload["content"]["settlementTime"] = json!("yesterday");
        let errors = validate(&payload);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "content.settlementTime");
    }
}
