//! Integration tests for the landing → staging merge paths, against an
//! in-memory SQLite warehouse with the real migrations applied.
use api_types::webhook::WebhookPayload;
use engine::{Warehouse, landing, staging};
use migration::MigratorTrait;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, Database, Statement};
use serde_json::{Value, json};
use std::str::FromStr;

async fn warehouse() -> Warehouse {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Warehouse::new(db)
}

fn webhook_payload(feed_item_uid: &str, minor_units: i64, user_note: Option<&str>) -> WebhookPayload {
    serde_json::from_value(json!({
        "webhookEventUid": format!("evt-{feed_item_uid}"),
        "eventTimestamp": "2025-11-26T12:00:00Z",
        "accountHolderUid": "holder-1",
        "content": {
            "feedItemUid": feed_item_uid,
            "categoryUid": "cat-1",
            "accountUid": "acc-1",
            "amount": {"currency": "GBP", "minorUnits": minor_units},
            "sourceAmount": {"currency": "GBP", "minorUnits": minor_units},
            "direction": "OUT",
            "updatedAt": "2025-11-26T12:00:00Z",
            "transactionTime": "2025-11-26T12:00:00Z",
            "settlementTime": "2025-11-26T12:00:00Z",
            "source": "MASTER_CARD",
            "status": "SETTLED",
            "transactingApplicationUserUid": "user-1",
            "counterPartyType": "MERCHANT",
            "counterPartyUid": "merchant-1",
            "counterPartyName": "Test_Store",
            "spendingCategory": "EATING_OUT",
            "userNote": user_note,
            "hasAttachment": false,
            "receiptPresent": false
        }
    }))
    .unwrap()
}

async fn scalar_i64(warehouse: &Warehouse, sql: &str) -> i64 {
    warehouse
        .connection()
        .query_one(Statement::from_string(warehouse.backend(), sql.to_owned()))
        .await
        .unwrap()
        .unwrap()
        .try_get::<i64>("", "n")
        .unwrap()
}

async fn staging_row(warehouse: &Warehouse, transaction_id: &str) -> sea_orm::QueryResult {
    warehouse
        .connection()
        .query_one(Statement::from_sql_and_values(
            warehouse.backend(),
            "SELECT * FROM \"stg_transactions\" WHERE transaction_id = ?",
            [transaction_id.into()],
        ))
        .await
        .unwrap()
        .expect("staging row should exist")
}

/// Seeds one raw api-pull record through the landing loader, including an
/// unexpected upstream field that projection must drop.
async fn seed_api_pull(warehouse: &Warehouse, feed_item_uid: &str, minor_units: i64) {
    let record = json!({
        "feedItemUid": feed_item_uid,
        "categoryUid": "cat-1",
        "direction": "OUT",
        "updatedAt": "2025-11-20T09:00:00.000Z",
        "transactionTime": "2025-11-20T09:00:00.000Z",
        "settlementTime": "2025-11-20T09:00:00.000Z",
        "source": "MASTER_CARD",
        "sourceSubType": "CONTACTLESS",
        "status": "SETTLED",
        "transactingApplicationUserUid": "user-1",
        "counterPartyType": "MERCHANT",
        "counterPartyUid": "merchant-1",
        "counterPartyName": "Corner_Shop",
        "reference": "ref-1",
        "country": "GB",
        "spendingCategory": "GROCERIES",
        "userNote": "weekly shop",
        "hasAttachment": false,
        "hasReceipt": false,
        "amount": {"currency": "GBP", "minorUnits": minor_units},
        "sourceAmount": {"currency": "GBP", "minorUnits": minor_units},
        "newStarlingField": "dropped by projection"
    });
    let columns = landing::columns(warehouse, landing::TRANSACTIONS_API_PULL_TABLE)
        .await
        .unwrap();
    let rows = vec![landing::flatten(&record)];
    let inserted = landing::insert_rows(
        warehouse,
        landing::TRANSACTIONS_API_PULL_TABLE,
        &columns,
        &rows,
    )
    .await
    .unwrap();
    assert_eq!(inserted, 1);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
}

#[tokio::test]
async fn webhook_replay_keeps_one_landing_row_with_last_delivery() {
    let wh = warehouse().await;

    landing::upsert_webhook_transaction(&wh, &webhook_payload("abc-1", 2599, Some("first")))
        .await
        .unwrap();
    landing::upsert_webhook_transaction(&wh, &webhook_payload("abc-1", 2599, Some("second")))
        .await
        .unwrap();
    landing::upsert_webhook_transaction(&wh, &webhook_payload("abc-1", 2599, Some("third")))
        .await
        .unwrap();

    let count = scalar_i64(&wh, "SELECT COUNT(*) AS n FROM \"lnd_transactions_webhook\"").await;
    assert_eq!(count, 1);

    let row = wh
        .connection()
        .query_one(Statement::from_string(
            wh.backend(),
            "SELECT \"userNote\", \"amount_minorUnits\" FROM \"lnd_transactions_webhook\""
                .to_owned(),
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.try_get::<String>("", "userNote").unwrap(), "third");
    assert_eq!(row.try_get::<i64>("", "amount_minorUnits").unwrap(), 2599);
}

#[tokio::test]
async fn webhook_merge_end_to_end() {
    let wh = warehouse().await;

    landing::upsert_webhook_transaction(&wh, &webhook_payload("abc-1", 2599, None))
        .await
        .unwrap();
    let written = staging::merge_webhook_transactions(&wh).await.unwrap();
    assert_eq!(written, 1);

    let row = staging_row(&wh, "abc-1").await;
    assert_eq!(row.try_get::<String>("", "data_source").unwrap(), "webhook");
    assert_eq!(row.try_get::<String>("", "in_or_out").unwrap(), "out");
    assert_eq!(
        row.try_get::<String>("", "counter_party_name").unwrap(),
        "test store"
    );
    assert_eq!(
        row.try_get::<String>("", "spending_category").unwrap(),
        "eating out"
    );
    assert_eq!(row.try_get::<f64>("", "amount").unwrap(), 25.99);
    assert_eq!(
        row.try_get::<String>("", "last_modified_by").unwrap(),
        "starpipe"
    );
}

#[tokio::test]
async fn merge_replay_is_idempotent_in_staging() {
    let wh = warehouse().await;

    landing::upsert_webhook_transaction(&wh, &webhook_payload("abc-1", 2599, Some("note")))
        .await
        .unwrap();
    staging::merge_webhook_transactions(&wh).await.unwrap();
    staging::merge_webhook_transactions(&wh).await.unwrap();
    staging::merge_webhook_transactions(&wh).await.unwrap();

    let count = scalar_i64(&wh, "SELECT COUNT(*) AS n FROM \"stg_transactions\"").await;
    assert_eq!(count, 1);
}

#[tokio::test]
async fn merge_selects_strictly_newer_rows_only() {
    let wh = warehouse().await;

    landing::upsert_webhook_transaction(&wh, &webhook_payload("abc-1", 2599, Some("merged")))
        .await
        .unwrap();
    staging::merge_webhook_transactions(&wh).await.unwrap();

    // Rewrite the landing note while pinning last_modified to the value the
    // staging row already carries: an exact timestamp tie.
    wh.execute_raw(
        "UPDATE \"lnd_transactions_webhook\" SET \"userNote\" = 'sneaky edit', \
         \"last_modified\" = (SELECT MAX(last_modified) FROM \"stg_transactions\")",
        "pin landing watermark",
    )
    .await
    .unwrap();

    let written = staging::merge_webhook_transactions(&wh).await.unwrap();
    assert_eq!(written, 0, "a timestamp tie must not be reselected");
    let row = staging_row(&wh, "abc-1").await;
    assert_eq!(row.try_get::<String>("", "user_note").unwrap(), "merged");

    // Now move the landing row strictly past the watermark: it wins.
    wh.execute_raw(
        "UPDATE \"lnd_transactions_webhook\" SET \"last_modified\" = '2100-01-01 00:00:00'",
        "advance landing watermark",
    )
    .await
    .unwrap();
    let written = staging::merge_webhook_transactions(&wh).await.unwrap();
    assert_eq!(written, 1);
    let row = staging_row(&wh, "abc-1").await;
    assert_eq!(row.try_get::<String>("", "user_note").unwrap(), "sneaky edit");
}

#[tokio::test]
async fn newer_webhook_overwrites_api_pull_row() {
    let wh = warehouse().await;

    seed_api_pull(&wh, "abc-2", 1000).await;
    staging::refresh_transactions(&wh).await.unwrap();

    let row = staging_row(&wh, "abc-2").await;
    assert_eq!(row.try_get::<String>("", "data_source").unwrap(), "api_pull");
    assert_eq!(
        row.try_get::<String>("", "counter_party_name").unwrap(),
        "corner shop"
    );

    // A webhook delivery for the same feed item, stamped later than the
    // api-pull merge.
    landing::upsert_webhook_transaction(&wh, &webhook_payload("abc-2", 2599, Some("updated")))
        .await
        .unwrap();
    wh.execute_raw(
        "UPDATE \"lnd_transactions_webhook\" SET \"last_modified\" = '2100-01-01 00:00:00'",
        "advance landing watermark",
    )
    .await
    .unwrap();
    staging::merge_webhook_transactions(&wh).await.unwrap();

    let count = scalar_i64(&wh, "SELECT COUNT(*) AS n FROM \"stg_transactions\"").await;
    assert_eq!(count, 1, "merge must upsert on the key, never blind-insert");

    let row = staging_row(&wh, "abc-2").await;
    assert_eq!(row.try_get::<String>("", "data_source").unwrap(), "webhook");
    assert_eq!(row.try_get::<f64>("", "amount").unwrap(), 25.99);
    assert_eq!(row.try_get::<String>("", "user_note").unwrap(), "updated");
}

#[tokio::test]
async fn full_refresh_normalizes_api_pull_rows() {
    let wh = warehouse().await;

    seed_api_pull(&wh, "abc-3", 1050).await;
    staging::refresh_transactions(&wh).await.unwrap();

    let row = staging_row(&wh, "abc-3").await;
    assert_eq!(row.try_get::<String>("", "in_or_out").unwrap(), "out");
    assert_eq!(
        row.try_get::<String>("", "source_type").unwrap(),
        "contactless"
    );
    assert_eq!(
        row.try_get::<String>("", "spending_category").unwrap(),
        "groceries"
    );
    assert_eq!(row.try_get::<f64>("", "amount").unwrap(), 10.50);
    assert_eq!(row.try_get::<Option<String>>("", "status").unwrap(), None);

    // A second refresh truncates and reloads instead of duplicating.
    staging::refresh_transactions(&wh).await.unwrap();
    let count = scalar_i64(&wh, "SELECT COUNT(*) AS n FROM \"stg_transactions\"").await;
    assert_eq!(count, 1);
}

#[tokio::test]
async fn spaces_and_balance_full_refresh() {
    let wh = warehouse().await;

    let space = json!({
        "savingsGoalUid": "space-1",
        "name": "Holiday",
        "sortOrder": 1,
        "state": "ACTIVE",
        "totalSaved": {"currency": "GBP", "minorUnits": 123456}
    });
    let columns = landing::columns(&wh, landing::SPACES_TABLE).await.unwrap();
    landing::insert_rows(&wh, landing::SPACES_TABLE, &columns, &[landing::flatten(&space)])
        .await
        .unwrap();
    staging::refresh_spaces(&wh).await.unwrap();

    let row = wh
        .connection()
        .query_one(Statement::from_string(
            wh.backend(),
            "SELECT space_name, amount FROM \"stg_spaces\"".to_owned(),
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.try_get::<String>("", "space_name").unwrap(), "Holiday");
    assert_eq!(row.try_get::<f64>("", "amount").unwrap(), 1234.56);

    let balance: Value = json!({
        "clearedBalance": {"currency": "GBP", "minorUnits": 110000},
        "effectiveBalance": {"currency": "GBP", "minorUnits": 100000},
        "pendingTransactions": {"currency": "GBP", "minorUnits": 0},
        "acceptedOverdraft": {"currency": "GBP", "minorUnits": 0},
        "totalClearedBalance": {"currency": "GBP", "minorUnits": 150000},
        "totalEffectiveBalance": {"currency": "GBP", "minorUnits": 140000}
    });
    let columns = landing::columns(&wh, landing::BALANCE_TABLE).await.unwrap();
    landing::insert_rows(&wh, landing::BALANCE_TABLE, &columns, &[landing::flatten(&balance)])
        .await
        .unwrap();
    staging::refresh_balance(&wh).await.unwrap();

    let row = wh
        .connection()
        .query_one(Statement::from_string(
            wh.backend(),
            "SELECT balance, balance_with_spaces FROM \"stg_balance\"".to_owned(),
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.try_get::<f64>("", "balance").unwrap(), 1000.00);
    assert_eq!(
        row.try_get::<f64>("", "balance_with_spaces").unwrap(),
        1500.00
    );
}

#[tokio::test]
async fn reports_aggregate_staged_spending() {
    let wh = warehouse().await;

    landing::upsert_webhook_transaction(&wh, &webhook_payload("abc-1", 2599, None))
        .await
        .unwrap();
    staging::merge_webhook_transactions(&wh).await.unwrap();

    let summary = engine::reports::spending_summary(&wh, "2025-11", "2025-11")
        .await
        .unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].year_month, "2025-11");
    assert_eq!(
        summary[0].spending_category.as_deref(),
        Some("eating out")
    );
    assert_eq!(
        summary[0].total_amount,
        Decimal::from_str("25.99").unwrap()
    );

    let trend = engine::reports::monthly_trend(&wh, "2025-01").await.unwrap();
    assert_eq!(trend.len(), 1);
    assert_eq!(trend[0].year_month, "2025-11");

    assert_eq!(engine::reports::months_in_range(&wh, "2025-11", "2025-12").await, 1);

    // Outside the range there is nothing to report.
    let empty = engine::reports::spending_summary(&wh, "2024-01", "2024-02")
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn months_in_range_degrades_to_one_on_failure() {
    // No migrations: the staging table does not exist, the query fails, and
    // the helper falls back instead of surfacing the error to the UI.
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let wh = Warehouse::new(db);
    assert_eq!(engine::reports::months_in_range(&wh, "2025-01", "2025-02").await, 1);
}
