//! Dashboard query layer: read-only aggregates over the staging tables,
//! parameterized by an inclusive `YYYY-MM` month range.
//!
//! Nothing here writes. The one deliberate softness is
//! [`months_in_range`], which falls back to 1 on failure rather than
//! crashing the UI over a non-critical read.
use api_types::reports::{BalanceView, CounterpartySpend, SpendingRow, TrendPoint};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, Statement};

use crate::calendar;
use crate::error::PipelineError;
use crate::money;
use crate::staging::TRANSACTIONS_TABLE;
use crate::warehouse::Warehouse;

/// Spend per (month, category, counterparty) cell within the range,
/// largest first.
pub async fn spending_summary(
    warehouse: &Warehouse,
    from_month: &str,
    to_month: &str,
) -> Result<Vec<SpendingRow>, PipelineError> {
    let month = warehouse.month_expr("transaction_time");
    let sql = format!(
        "SELECT {month} AS year_month, spending_category, counter_party_name, \
         SUM(amount) AS total_amount \
         FROM {stg} \
         WHERE in_or_out = 'out' AND {month} >= {p1} AND {month} <= {p2} \
         GROUP BY {month}, spending_category, counter_party_name \
         ORDER BY total_amount DESC",
        stg = warehouse.staging(TRANSACTIONS_TABLE),
        p1 = warehouse.placeholder(1),
        p2 = warehouse.placeholder(2),
    );

    let rows = warehouse
        .connection()
        .query_all(Statement::from_sql_and_values(
            warehouse.backend(),
            sql,
            [from_month.into(), to_month.into()],
        ))
        .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(SpendingRow {
            year_month: row.try_get("", "year_month")?,
            spending_category: row.try_get("", "spending_category")?,
            counter_party_name: row.try_get("", "counter_party_name")?,
            total_amount: row.try_get("", "total_amount")?,
        });
    }
    Ok(out)
}

/// Monthly outgoing totals from `from_month` onward, oldest first.
pub async fn monthly_trend(
    warehouse: &Warehouse,
    from_month: &str,
) -> Result<Vec<TrendPoint>, PipelineError> {
    let month = warehouse.month_expr("transaction_time");
    let sql = format!(
        "SELECT {month} AS year_month, SUM(amount) AS monthly_total \
         FROM {stg} \
         WHERE in_or_out = 'out' AND {month} >= {p1} \
         GROUP BY {month} \
         ORDER BY year_month",
        stg = warehouse.staging(TRANSACTIONS_TABLE),
        p1 = warehouse.placeholder(1),
    );

    let rows = warehouse
        .connection()
        .query_all(Statement::from_sql_and_values(
            warehouse.backend(),
            sql,
            [from_month.into()],
        ))
        .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(TrendPoint {
            year_month: row.try_get("", "year_month")?,
            monthly_total: row.try_get("", "monthly_total")?,
        });
    }
    Ok(out)
}

/// Top-`limit` counterparties by outgoing spend within the range.
pub async fn top_counterparties(
    warehouse: &Warehouse,
    from_month: &str,
    to_month: &str,
    limit: u32,
) -> Result<Vec<CounterpartySpend>, PipelineError> {
    let month = warehouse.month_expr("transaction_time");
    let sql = format!(
        "SELECT counter_party_name, SUM(amount) AS total_amount \
         FROM {stg} \
         WHERE in_or_out = 'out' AND {month} >= {p1} AND {month} <= {p2} \
         GROUP BY counter_party_name \
         ORDER BY total_amount DESC \
         LIMIT {limit}",
        stg = warehouse.staging(TRANSACTIONS_TABLE),
        p1 = warehouse.placeholder(1),
        p2 = warehouse.placeholder(2),
    );

    let rows = warehouse
        .connection()
        .query_all(Statement::from_sql_and_values(
            warehouse.backend(),
            sql,
            [from_month.into(), to_month.into()],
        ))
        .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(CounterpartySpend {
            counter_party_name: row.try_get("", "counter_party_name")?,
            total_amount: row.try_get("", "total_amount")?,
        });
    }
    Ok(out)
}

/// Number of distinct months with data in the range.
///
/// Best-effort: a failure here is logged and reported as 1 so the per-month
/// figures on the dashboard stay renderable.
pub async fn months_in_range(warehouse: &Warehouse, from_month: &str, to_month: &str) -> u32 {
    let month = warehouse.month_expr("transaction_time");
    let sql = format!(
        "SELECT COUNT(DISTINCT {month}) AS num_months \
         FROM {stg} \
         WHERE {month} >= {p1} AND {month} <= {p2}",
        stg = warehouse.staging(TRANSACTIONS_TABLE),
        p1 = warehouse.placeholder(1),
        p2 = warehouse.placeholder(2),
    );

    let result = warehouse
        .connection()
        .query_one(Statement::from_sql_and_values(
            warehouse.backend(),
            sql,
            [from_month.into(), to_month.into()],
        ))
        .await;

    match result {
        Ok(Some(row)) => match row.try_get::<i64>("", "num_months") {
            Ok(count) if count > 0 => count as u32,
            _ => 1,
        },
        Ok(None) => 1,
        Err(err) => {
            tracing::error!(error = %err, "failed to count months in range, defaulting to 1");
            1
        }
    }
}

/// The most recent balance snapshot, if staging has one.
pub async fn latest_balance(warehouse: &Warehouse) -> Result<Option<BalanceView>, PipelineError> {
    let sql = format!(
        "SELECT balance, balance_with_spaces, received_at \
         FROM {stg} \
         ORDER BY received_at DESC \
         LIMIT 1",
        stg = warehouse.staging("balance"),
    );

    let row = warehouse
        .connection()
        .query_one(Statement::from_string(warehouse.backend(), sql))
        .await?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(BalanceView {
        balance: row.try_get("", "balance")?,
        balance_with_spaces: row.try_get("", "balance_with_spaces")?,
        received_at: row.try_get::<Option<DateTime<Utc>>>("", "received_at")?,
    }))
}

/// Remaining budget spread over the days left in the current month.
#[must_use]
pub fn budget_per_day(available: Decimal, today: NaiveDate) -> Decimal {
    money::per_day(available, calendar::days_left_in_month(today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn budget_per_day_uses_remaining_days() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(); // 16 days left
        let budget = Decimal::from_str("160.00").unwrap();
        assert_eq!(
            budget_per_day(budget, today),
            Decimal::from_str("10.00").unwrap()
        );
    }
}
