//! Staging merger: landing rows into the canonical `stg` tables.
//!
//! Two strategies, selected per entity by ingestion path:
//!
//! - full refresh (api-pull transactions, spaces, balance): truncate the
//!   staging table and repopulate it from landing in one transaction;
//! - incremental (webhook transactions): a watermark-based upsert keyed on
//!   the feed-item identifier.
//!
//! Both transaction paths share one normalization fragment, so an api-pull
//! row and a webhook row for the same feed item normalize identically.
use crate::error::PipelineError;
use crate::landing::{
    BALANCE_TABLE, SPACES_TABLE, TRANSACTIONS_API_PULL_TABLE, TRANSACTIONS_WEBHOOK_TABLE,
};
use crate::warehouse::Warehouse;

pub const TRANSACTIONS_TABLE: &str = "transactions";

const STAGING_TRANSACTION_COLUMNS: &[&str] = &[
    "transaction_id",
    "space_id",
    "in_or_out",
    "updated_at",
    "transaction_time",
    "source_type",
    "counter_party_type",
    "counter_party_name",
    "reference",
    "user_note",
    "country",
    "spending_category",
    "currency",
    "amount",
    "status",
    "received_at",
    "data_source",
    "last_modified",
    "last_modified_by",
];

#[derive(Clone, Copy)]
enum TransactionSource {
    ApiPull,
    Webhook,
}

fn fold_label(column: &str) -> String {
    format!("LOWER(REPLACE(\"{column}\", '_', ' '))")
}

/// The normalization SELECT shared by both transaction paths: case folding,
/// underscore-to-space on categorical labels, timestamp casts, minor-units to
/// fixed-point decimal, and the literal column renames.
fn normalized_transaction_select(warehouse: &Warehouse, source: TransactionSource) -> String {
    let (source_type, currency, minor_units, data_source, last_modified) = match source {
        TransactionSource::ApiPull => (
            fold_label("sourceSubType"),
            "\"amount.currency\"".to_string(),
            "\"amount.minorUnits\"".to_string(),
            "'api_pull'",
            "CURRENT_TIMESTAMP".to_string(),
        ),
        // The webhook payload has no sourceSubType; landing flattens the
        // monetary sub-objects to underscore names and carries the upsert
        // time as the merge watermark.
        TransactionSource::Webhook => (
            "'unavailable'".to_string(),
            "\"amount_currency\"".to_string(),
            "\"amount_minorUnits\"".to_string(),
            "'webhook'",
            "\"last_modified\"".to_string(),
        ),
    };

    format!(
        "SELECT \
         \"feedItemUid\", \
         \"categoryUid\", \
         LOWER(\"direction\"), \
         {updated_at}, \
         {transaction_time}, \
         {source_type}, \
         {counter_party_type}, \
         {counter_party_name}, \
         \"reference\", \
         \"userNote\", \
         \"country\", \
         {spending_category}, \
         {currency}, \
         CAST({minor_units} / 100.0 AS DECIMAL(10, 2)), \
         NULL, \
         \"received_at\", \
         {data_source}, \
         {last_modified}, \
         {writer}",
        updated_at = warehouse.ts_cast("\"updatedAt\""),
        transaction_time = warehouse.ts_cast("\"transactionTime\""),
        counter_party_type = fold_label("counterPartyType"),
        counter_party_name = fold_label("counterPartyName"),
        spending_category = fold_label("spendingCategory"),
        writer = warehouse.session_user_expr(),
    )
}

fn insert_transactions_sql(warehouse: &Warehouse) -> String {
    format!(
        "INSERT INTO {stg} ({columns}) {select} FROM {lnd}",
        stg = warehouse.staging(TRANSACTIONS_TABLE),
        columns = STAGING_TRANSACTION_COLUMNS.join(", "),
        select = normalized_transaction_select(warehouse, TransactionSource::ApiPull),
        lnd = warehouse.landing(TRANSACTIONS_API_PULL_TABLE),
    )
}

/// The incremental merge statement.
///
/// Selects only webhook-landing rows whose `last_modified` is strictly newer
/// than the maximum already present in staging, then upserts on the
/// feed-item identifier: update every mutable field (provenance and audit
/// columns included) when the key exists, insert otherwise. A row whose
/// `last_modified` equals the staging maximum is not reselected — on an
/// exact timestamp tie the row already in staging wins.
pub fn merge_webhook_sql(warehouse: &Warehouse) -> String {
    let stg = warehouse.staging(TRANSACTIONS_TABLE);
    let updates: Vec<String> = STAGING_TRANSACTION_COLUMNS
        .iter()
        .skip(1) // never rewrite the key
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    format!(
        "INSERT INTO {stg} ({columns}) {select} FROM {lnd} \
         WHERE \"last_modified\" > (SELECT COALESCE(MAX(last_modified), {epoch}) FROM {stg}) \
         ON CONFLICT (transaction_id) DO UPDATE SET {updates}",
        columns = STAGING_TRANSACTION_COLUMNS.join(", "),
        select = normalized_transaction_select(warehouse, TransactionSource::Webhook),
        lnd = warehouse.landing(TRANSACTIONS_WEBHOOK_TABLE),
        epoch = warehouse.epoch_literal(),
        updates = updates.join(", "),
    )
}

/// Truncate + repopulate `stg.transactions` from the api-pull landing table,
/// as one transaction: a failure mid-transform leaves the prior staging
/// state intact.
pub async fn refresh_transactions(warehouse: &Warehouse) -> Result<(), PipelineError> {
    let stg = warehouse.staging(TRANSACTIONS_TABLE);
    let statements = [
        (
            warehouse.truncate_sql(&stg),
            "truncate staging transactions",
        ),
        (
            insert_transactions_sql(warehouse),
            "insert transactions to staging from landing",
        ),
    ];
    warehouse
        .execute_transaction(&statements, "transactions to staging")
        .await
}

/// Applies the incremental webhook merge. Returns the number of staging rows
/// written (inserted or updated).
pub async fn merge_webhook_transactions(warehouse: &Warehouse) -> Result<u64, PipelineError> {
    warehouse
        .execute_raw(&merge_webhook_sql(warehouse), "merge webhook transactions")
        .await
}

pub async fn refresh_spaces(warehouse: &Warehouse) -> Result<(), PipelineError> {
    let stg = warehouse.staging(SPACES_TABLE);
    let insert = format!(
        "INSERT INTO {stg} (space_id, space_name, amount, received_at, last_modified) \
         SELECT \"savingsGoalUid\", \"name\", \
         CAST(\"totalSaved.minorUnits\" / 100.0 AS DECIMAL(10, 2)), \
         \"received_at\", CURRENT_TIMESTAMP \
         FROM {lnd}",
        lnd = warehouse.landing(SPACES_TABLE),
    );
    let statements = [
        (warehouse.truncate_sql(&stg), "truncate staging spaces"),
        (insert, "insert spaces to staging from landing"),
    ];
    warehouse
        .execute_transaction(&statements, "spaces to staging")
        .await
}

pub async fn refresh_balance(warehouse: &Warehouse) -> Result<(), PipelineError> {
    let stg = warehouse.staging(BALANCE_TABLE);
    let insert = format!(
        "INSERT INTO {stg} (balance, balance_with_spaces, received_at, last_modified) \
         SELECT CAST(\"effectiveBalance.minorUnits\" / 100.0 AS DECIMAL(19, 2)), \
         CAST(\"totalClearedBalance.minorUnits\" / 100.0 AS DECIMAL(19, 2)), \
         \"received_at\", CURRENT_TIMESTAMP \
         FROM {lnd}",
        lnd = warehouse.landing(BALANCE_TABLE),
    );
    let statements = [
        (warehouse.truncate_sql(&stg), "truncate staging balance"),
        (insert, "insert balance to staging from landing"),
    ];
    warehouse
        .execute_transaction(&statements, "balance to staging")
        .await
}
