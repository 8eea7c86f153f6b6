use sea_orm::{ConnectionTrait, DbBackend};
use sea_orm_migration::prelude::*;

use crate::landing_table;

#[derive(DeriveMigrationName)]
pub struct Migration;

// Landing columns mirror the upstream field names verbatim, including the
// dot-separated names produced by flattening nested JSON objects, so they are
// spelled out as aliases rather than Iden enums.
fn string_col(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name)).string().to_owned()
}

fn big_int_col(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name)).big_integer().to_owned()
}

fn bool_col(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name)).boolean().to_owned()
}

fn received_at_col() -> ColumnDef {
    ColumnDef::new(Alias::new("received_at"))
        .timestamp_with_time_zone()
        .default(Expr::current_timestamp())
        .to_owned()
}

const TRANSACTIONS_API_PULL_STRING_COLS: &[&str] = &[
    "feedItemUid",
    "categoryUid",
    "direction",
    "updatedAt",
    "transactionTime",
    "settlementTime",
    "source",
    "sourceSubType",
    "status",
    "transactingApplicationUserUid",
    "counterPartyType",
    "counterPartyUid",
    "counterPartyName",
    "counterPartySubEntityUid",
    "counterPartySubEntityName",
    "counterPartySubEntityIdentifier",
    "counterPartySubEntitySubIdentifier",
    "reference",
    "country",
    "spendingCategory",
    "userNote",
    "batchPaymentDetails",
    "amount.currency",
    "sourceAmount.currency",
];

const TRANSACTIONS_WEBHOOK_STRING_COLS: &[&str] = &[
    "categoryUid",
    "accountUid",
    "amount_currency",
    "sourceAmount_currency",
    "direction",
    "updatedAt",
    "transactionTime",
    "settlementTime",
    "source",
    "status",
    "transactingApplicationUserUid",
    "counterPartyType",
    "counterPartyUid",
    "counterPartyName",
    "counterPartySubEntityUid",
    "counterPartySubEntityName",
    "counterPartySubEntityIdentifier",
    "counterPartySubEntitySubIdentifier",
    "totalFeeAmount_currency",
    "reference",
    "country",
    "spendingCategory",
    "userNote",
    "roundUp_goalCategoryUid",
    "roundUp_amount_currency",
    "feedItemFailureReason",
    "sourceUid",
    "webhookEventUid",
    "eventTimestamp",
    "accountHolderUid",
];

const BALANCE_AMOUNT_FIELDS: &[&str] = &[
    "clearedBalance",
    "effectiveBalance",
    "pendingTransactions",
    "acceptedOverdraft",
    "totalClearedBalance",
    "totalEffectiveBalance",
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        if backend == DbBackend::Postgres {
            manager
                .get_connection()
                .execute_unprepared("CREATE SCHEMA IF NOT EXISTS lnd")
                .await?;
        }

        // lnd.transactions_api_pull: append-only, truncated before each bulk
        // reload, so no key and no uniqueness constraint.
        let mut transactions = Table::create();
        transactions
            .table(landing_table(backend, "transactions_api_pull"))
            .if_not_exists();
        for name in TRANSACTIONS_API_PULL_STRING_COLS {
            transactions.col(string_col(name));
        }
        transactions
            .col(big_int_col("amount.minorUnits"))
            .col(big_int_col("sourceAmount.minorUnits"))
            .col(bool_col("hasAttachment"))
            .col(bool_col("hasReceipt"))
            .col(received_at_col());
        manager.create_table(transactions.to_owned()).await?;

        // lnd.transactions_webhook: keyed by feedItemUid so redelivery of the
        // same event replaces the previous row. Monetary sub-objects arrive
        // already flattened to `<field>_currency` / `<field>_minorUnits`.
        let mut webhook = Table::create();
        webhook
            .table(landing_table(backend, "transactions_webhook"))
            .if_not_exists()
            .col(
                ColumnDef::new(Alias::new("feedItemUid"))
                    .string()
                    .not_null()
                    .primary_key(),
            );
        for name in TRANSACTIONS_WEBHOOK_STRING_COLS {
            webhook.col(string_col(name));
        }
        webhook
            .col(big_int_col("amount_minorUnits"))
            .col(big_int_col("sourceAmount_minorUnits"))
            .col(big_int_col("totalFeeAmount_minorUnits"))
            .col(big_int_col("roundUp_amount_minorUnits"))
            .col(ColumnDef::new(Alias::new("exchangeRate")).double())
            .col(bool_col("hasAttachment"))
            .col(bool_col("receiptPresent"))
            .col(
                ColumnDef::new(Alias::new("last_modified"))
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(received_at_col());
        manager.create_table(webhook.to_owned()).await?;

        manager
            .create_table(
                Table::create()
                    .table(landing_table(backend, "spaces"))
                    .if_not_exists()
                    .col(string_col("savingsGoalUid"))
                    .col(string_col("name"))
                    .col(big_int_col("sortOrder"))
                    .col(string_col("state"))
                    .col(string_col("totalSaved.currency"))
                    .col(big_int_col("totalSaved.minorUnits"))
                    .col(received_at_col())
                    .to_owned(),
            )
            .await?;

        let mut balance = Table::create();
        balance
            .table(landing_table(backend, "balance"))
            .if_not_exists();
        for field in BALANCE_AMOUNT_FIELDS {
            balance.col(string_col(&format!("{field}.currency")));
            balance.col(big_int_col(&format!("{field}.minorUnits")));
        }
        balance.col(received_at_col());
        manager.create_table(balance.to_owned()).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        for name in [
            "transactions_api_pull",
            "transactions_webhook",
            "spaces",
            "balance",
        ] {
            manager
                .drop_table(Table::drop().table(landing_table(backend, name)).to_owned())
                .await?;
        }
        Ok(())
    }
}
