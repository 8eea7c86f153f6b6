//! Landing loader: raw API records into the `lnd` tables.
//!
//! Bulk-pull records arrive as nested JSON; they are flattened into
//! dot-separated column names, projected onto the columns the landing table
//! actually has, and appended with a `received_at` stamp. Webhook records are
//! upserted by `feedItemUid` so redelivery of the same event is idempotent.
use api_types::webhook::WebhookPayload;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ConnectionTrait, Statement};
use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::warehouse::{LANDING_SCHEMA, Warehouse};

pub const TRANSACTIONS_API_PULL_TABLE: &str = "transactions_api_pull";
pub const TRANSACTIONS_WEBHOOK_TABLE: &str = "transactions_webhook";
pub const SPACES_TABLE: &str = "spaces";
pub const BALANCE_TABLE: &str = "balance";

/// Flattens a raw JSON record into a single-level map.
///
/// Nested objects contribute dot-separated keys (`amount.minorUnits`);
/// arrays are kept as serialized JSON text, matching the landing columns.
#[must_use]
pub fn flatten(record: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    if let Value::Object(fields) = record {
        flatten_into(None, fields, &mut out);
    }
    out
}

fn flatten_into(prefix: Option<&str>, fields: &Map<String, Value>, out: &mut Map<String, Value>) {
    for (key, value) in fields {
        let name = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten_into(Some(&name), nested, out),
            Value::Array(_) => {
                out.insert(name, Value::String(value.to_string()));
            }
            other => {
                out.insert(name, other.clone());
            }
        }
    }
}

/// Lists the columns of a landing table. Introspected once per upload task,
/// not once per window.
pub async fn columns(warehouse: &Warehouse, table: &str) -> Result<Vec<String>, PipelineError> {
    warehouse.table_columns(LANDING_SCHEMA, table).await
}

/// Appends flattened records to a landing table.
///
/// The record is projected onto `columns` — the set the table actually has:
/// fields the upstream added since the DDL was written are dropped instead
/// of failing the run. `received_at` is filled by the column default.
pub async fn insert_rows(
    warehouse: &Warehouse,
    table: &str,
    columns: &[String],
    rows: &[Map<String, Value>],
) -> Result<u64, PipelineError> {
    if rows.is_empty() {
        return Ok(0);
    }

    let qualified = warehouse.landing(table);

    let mut inserted = 0u64;
    for row in rows {
        let mut names = Vec::new();
        let mut values = Vec::new();
        for column in columns {
            if column == "received_at" {
                continue;
            }
            if let Some(value) = row.get(column) {
                if !value.is_null() {
                    names.push(format!("\"{column}\""));
                    values.push(bind_value(value));
                }
            }
        }
        if names.is_empty() {
            continue;
        }

        let sql = format!(
            "INSERT INTO {qualified} ({}) VALUES ({})",
            names.join(", "),
            warehouse.placeholders(values.len()),
        );
        warehouse
            .connection()
            .execute(Statement::from_sql_and_values(
                warehouse.backend(),
                sql,
                values,
            ))
            .await?;
        inserted += 1;
    }

    tracing::info!(table, rows = inserted, "loaded landing rows");
    Ok(inserted)
}

fn bind_value(value: &Value) -> sea_orm::Value {
    match value {
        Value::String(s) => s.clone().into(),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        other => other.to_string().into(),
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Insert-or-replace of a validated webhook payload, keyed on `feedItemUid`.
///
/// Monetary sub-objects are decomposed into `<field>_currency` /
/// `<field>_minorUnits` columns. `last_modified` is stamped with the
/// warehouse's current time, which is the watermark the incremental merge
/// reads. Unrecognized payload fields (`extra`) are dropped here.
pub async fn upsert_webhook_transaction(
    warehouse: &Warehouse,
    payload: &WebhookPayload,
) -> Result<(), PipelineError> {
    let content = &payload.content;
    let fee = content.total_fee_amount.as_ref();
    let round_up = content.round_up.as_ref();

    let columns: Vec<(&str, sea_orm::Value)> = vec![
        ("feedItemUid", content.feed_item_uid.clone().into()),
        ("categoryUid", content.category_uid.clone().into()),
        ("accountUid", content.account_uid.clone().into()),
        ("amount_currency", content.amount.currency.clone().into()),
        ("amount_minorUnits", content.amount.minor_units.into()),
        (
            "sourceAmount_currency",
            content.source_amount.currency.clone().into(),
        ),
        (
            "sourceAmount_minorUnits",
            content.source_amount.minor_units.into(),
        ),
        ("direction", content.direction.clone().into()),
        ("updatedAt", rfc3339(content.updated_at).into()),
        ("transactionTime", rfc3339(content.transaction_time).into()),
        ("settlementTime", rfc3339(content.settlement_time).into()),
        ("source", content.source.clone().into()),
        ("status", content.status.clone().into()),
        (
            "transactingApplicationUserUid",
            content.transacting_application_user_uid.clone().into(),
        ),
        ("counterPartyType", content.counter_party_type.clone().into()),
        ("counterPartyUid", content.counter_party_uid.clone().into()),
        ("counterPartyName", content.counter_party_name.clone().into()),
        (
            "counterPartySubEntityUid",
            content.counter_party_sub_entity_uid.clone().into(),
        ),
        (
            "counterPartySubEntityName",
            content.counter_party_sub_entity_name.clone().into(),
        ),
        (
            "counterPartySubEntityIdentifier",
            content.counter_party_sub_entity_identifier.clone().into(),
        ),
        (
            "counterPartySubEntitySubIdentifier",
            content
                .counter_party_sub_entity_sub_identifier
                .clone()
                .into(),
        ),
        ("exchangeRate", content.exchange_rate.into()),
        (
            "totalFeeAmount_currency",
            fee.map(|a| a.currency.clone()).into(),
        ),
        (
            "totalFeeAmount_minorUnits",
            fee.map(|a| a.minor_units).into(),
        ),
        ("reference", content.reference.clone().into()),
        ("country", content.country.clone().into()),
        ("spendingCategory", content.spending_category.clone().into()),
        ("userNote", content.user_note.clone().into()),
        (
            "roundUp_goalCategoryUid",
            round_up.map(|r| r.goal_category_uid.clone()).into(),
        ),
        (
            "roundUp_amount_currency",
            round_up.map(|r| r.amount.currency.clone()).into(),
        ),
        (
            "roundUp_amount_minorUnits",
            round_up.map(|r| r.amount.minor_units).into(),
        ),
        ("hasAttachment", content.has_attachment.into()),
        ("receiptPresent", content.receipt_present.into()),
        (
            "feedItemFailureReason",
            content.feed_item_failure_reason.clone().into(),
        ),
        ("sourceUid", content.source_uid.clone().into()),
        ("webhookEventUid", payload.webhook_event_uid.clone().into()),
        ("eventTimestamp", rfc3339(payload.event_timestamp).into()),
        ("accountHolderUid", payload.account_holder_uid.clone().into()),
    ];

    let qualified = warehouse.landing(TRANSACTIONS_WEBHOOK_TABLE);
    let names: Vec<String> = columns.iter().map(|(n, _)| format!("\"{n}\"")).collect();
    let updates: Vec<String> = columns
        .iter()
        .skip(1) // the key itself is never updated
        .map(|(n, _)| format!("\"{n}\" = excluded.\"{n}\""))
        .collect();
    let values: Vec<sea_orm::Value> = columns.into_iter().map(|(_, v)| v).collect();

    let sql = format!(
        "INSERT INTO {qualified} ({}, \"last_modified\") VALUES ({}, CURRENT_TIMESTAMP) \
         ON CONFLICT (\"feedItemUid\") DO UPDATE SET {}, \
         \"last_modified\" = CURRENT_TIMESTAMP, \"received_at\" = CURRENT_TIMESTAMP",
        names.join(", "),
        warehouse.placeholders(values.len()),
        updates.join(", "),
    );

    warehouse
        .connection()
        .execute(Statement::from_sql_and_values(
            warehouse.backend(),
            sql,
            values,
        ))
        .await?;

    tracing::info!(
        feed_item_uid = %payload.content.feed_item_uid,
        "persisted webhook transaction"
    );
    Ok(())
}
