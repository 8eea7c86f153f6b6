use sea_orm::{ConnectionTrait, DbBackend};
use sea_orm_migration::prelude::*;

use crate::staging_table;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Transactions {
    TransactionId,
    SpaceId,
    InOrOut,
    UpdatedAt,
    TransactionTime,
    SourceType,
    CounterPartyType,
    CounterPartyName,
    Reference,
    Country,
    SpendingCategory,
    Currency,
    Amount,
    UserNote,
    Status,
    DataSource,
    ReceivedAt,
    LastModified,
    LastModifiedBy,
}

#[derive(Iden)]
enum Spaces {
    SpaceId,
    SpaceName,
    Amount,
    ReceivedAt,
    LastModified,
}

#[derive(Iden)]
enum Balance {
    Balance,
    BalanceWithSpaces,
    ReceivedAt,
    LastModified,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        if backend == DbBackend::Postgres {
            manager
                .get_connection()
                .execute_unprepared("CREATE SCHEMA IF NOT EXISTS stg")
                .await?;
        }

        // Canonical transactions, keyed by the feed-item identifier. The merge
        // step upserts on this key regardless of which ingestion path produced
        // the record.
        manager
            .create_table(
                Table::create()
                    .table(staging_table(backend, "transactions"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::TransactionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::SpaceId).string().not_null())
                    .col(ColumnDef::new(Transactions::InOrOut).string().not_null())
                    .col(ColumnDef::new(Transactions::UpdatedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Transactions::TransactionTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::SourceType).string())
                    .col(ColumnDef::new(Transactions::CounterPartyType).string())
                    .col(ColumnDef::new(Transactions::CounterPartyName).string())
                    .col(ColumnDef::new(Transactions::Reference).string())
                    .col(ColumnDef::new(Transactions::Country).string())
                    .col(ColumnDef::new(Transactions::SpendingCategory).string())
                    .col(ColumnDef::new(Transactions::Currency).string())
                    .col(ColumnDef::new(Transactions::Amount).decimal_len(10, 2))
                    .col(ColumnDef::new(Transactions::UserNote).string())
                    .col(ColumnDef::new(Transactions::Status).string())
                    .col(ColumnDef::new(Transactions::DataSource).string())
                    .col(ColumnDef::new(Transactions::ReceivedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Transactions::LastModified).timestamp_with_time_zone())
                    .col(ColumnDef::new(Transactions::LastModifiedBy).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(staging_table(backend, "spaces"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Spaces::SpaceId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Spaces::SpaceName).string())
                    .col(ColumnDef::new(Spaces::Amount).decimal_len(10, 2))
                    .col(ColumnDef::new(Spaces::ReceivedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Spaces::LastModified).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Point-in-time snapshots, so no primary key.
        manager
            .create_table(
                Table::create()
                    .table(staging_table(backend, "balance"))
                    .if_not_exists()
                    .col(ColumnDef::new(Balance::Balance).decimal_len(19, 2))
                    .col(ColumnDef::new(Balance::BalanceWithSpaces).decimal_len(19, 2))
                    .col(ColumnDef::new(Balance::ReceivedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Balance::LastModified).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        for name in ["transactions", "spaces", "balance"] {
            manager
                .drop_table(Table::drop().table(staging_table(backend, name)).to_owned())
                .await?;
        }
        Ok(())
    }
}
