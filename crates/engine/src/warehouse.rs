//! Warehouse access: connection wrapper, SQL dialect helpers, labeled raw
//! execution, multi-statement transactions, and schema introspection.
//!
//! The production warehouse speaks Postgres-class SQL with real `lnd`/`stg`
//! schemas; the test suite runs against SQLite, where qualified names degrade
//! to `lnd_`/`stg_` prefixes and `TRUNCATE` to `DELETE FROM`. Everything that
//! differs between the two lives here so the merger can stay dialect-blind.
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement, TransactionTrait};

use crate::error::PipelineError;

pub const LANDING_SCHEMA: &str = "lnd";
pub const STAGING_SCHEMA: &str = "stg";

/// Writer label stamped into `last_modified_by` when the warehouse has no
/// session user of its own (SQLite).
pub const MERGE_WRITER: &str = "starpipe";

#[derive(Clone, Debug)]
pub struct Warehouse {
    db: DatabaseConnection,
}

impl Warehouse {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    /// Quoted, schema-qualified name of a landing table.
    pub fn landing(&self, table: &str) -> String {
        self.qualified(LANDING_SCHEMA, table)
    }

    /// Quoted, schema-qualified name of a staging table.
    pub fn staging(&self, table: &str) -> String {
        self.qualified(STAGING_SCHEMA, table)
    }

    fn qualified(&self, schema: &str, table: &str) -> String {
        match self.backend() {
            DbBackend::Sqlite => format!("\"{schema}_{table}\""),
            _ => format!("\"{schema}\".\"{table}\""),
        }
    }

    /// `TRUNCATE TABLE` where the backend has it, `DELETE FROM` otherwise.
    pub fn truncate_sql(&self, qualified: &str) -> String {
        match self.backend() {
            DbBackend::Sqlite => format!("DELETE FROM {qualified}"),
            _ => format!("TRUNCATE TABLE {qualified}"),
        }
    }

    /// Casts a textual timestamp expression to the warehouse timestamp type.
    ///
    /// SQLite has no timestamp type (and `CAST(… AS TIMESTAMPTZ)` would
    /// mangle ISO strings into numbers), so the expression passes through.
    pub fn ts_cast(&self, expr: &str) -> String {
        match self.backend() {
            DbBackend::Sqlite => expr.to_string(),
            _ => format!("CAST({expr} AS TIMESTAMPTZ)"),
        }
    }

    /// Timestamp literal predating any real data; used as the watermark
    /// fallback when staging is empty.
    pub fn epoch_literal(&self) -> String {
        self.ts_cast("'1900-01-01 00:00:00'")
    }

    /// Expression extracting `YYYY-MM` from a timestamp column.
    pub fn month_expr(&self, column: &str) -> String {
        match self.backend() {
            DbBackend::Sqlite => format!("strftime('%Y-%m', {column})"),
            _ => format!("to_char({column}, 'YYYY-MM')"),
        }
    }

    /// Expression naming the warehouse session user, or a constant writer
    /// label where the backend has none.
    pub fn session_user_expr(&self) -> String {
        match self.backend() {
            DbBackend::Sqlite => format!("'{MERGE_WRITER}'"),
            _ => "current_user".to_string(),
        }
    }

    /// The `i`-th (1-based) bind placeholder in this dialect.
    pub fn placeholder(&self, i: usize) -> String {
        match self.backend() {
            DbBackend::Postgres => format!("${i}"),
            _ => "?".to_string(),
        }
    }

    /// Positional bind placeholders for `n` values in this dialect.
    pub fn placeholders(&self, n: usize) -> String {
        match self.backend() {
            DbBackend::Postgres => (1..=n)
                .map(|i| format!("${i}"))
                .collect::<Vec<_>>()
                .join(", "),
            _ => vec!["?"; n].join(", "),
        }
    }

    /// Executes one statement, logging the operation label and a truncated
    /// SQL snippet for diagnosis. Returns the affected row count.
    pub async fn execute_raw(&self, sql: &str, label: &str) -> Result<u64, PipelineError> {
        let stmt = Statement::from_string(self.backend(), sql.to_owned());
        match self.db.execute(stmt).await {
            Ok(result) => {
                tracing::info!(label, sql = %snippet(sql), "executed raw sql");
                Ok(result.rows_affected())
            }
            Err(err) => {
                tracing::error!(label, sql = %snippet(sql), error = %err, "raw sql failed");
                Err(err.into())
            }
        }
    }

    /// Executes several statements in a single transaction.
    ///
    /// A failure anywhere rolls back the whole unit of work, so a
    /// truncate-then-insert pair can never leave a partially-empty staging
    /// table visible.
    pub async fn execute_transaction(
        &self,
        statements: &[(String, &str)],
        label: &str,
    ) -> Result<(), PipelineError> {
        let backend = self.backend();
        let tx = self.db.begin().await?;
        for (sql, description) in statements {
            tracing::info!(label, description, "executing");
            if let Err(err) = tx.execute(Statement::from_string(backend, sql.clone())).await {
                tracing::error!(
                    label,
                    description,
                    sql = %snippet(sql),
                    error = %err,
                    "transaction failed, rolling back"
                );
                let _ = tx.rollback().await;
                return Err(err.into());
            }
        }
        tx.commit().await?;
        tracing::info!(label, "transaction committed");
        Ok(())
    }

    /// Lists the columns a table currently has.
    ///
    /// The loader projects API responses onto exactly this set before
    /// writing, which absorbs upstream schema drift without failing the run.
    /// An empty result means the table is missing, which is fatal.
    pub async fn table_columns(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<String>, PipelineError> {
        let stmt = match self.backend() {
            DbBackend::Sqlite => Statement::from_sql_and_values(
                DbBackend::Sqlite,
                "SELECT name FROM pragma_table_info(?)",
                [format!("{schema}_{table}").into()],
            ),
            backend => Statement::from_sql_and_values(
                backend,
                "SELECT column_name AS name FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2",
                [schema.into(), table.into()],
            ),
        };

        let rows = self.db.query_all(stmt).await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(row.try_get::<String>("", "name")?);
        }
        if columns.is_empty() {
            return Err(PipelineError::SchemaDrift(format!(
                "{schema}.{table} has no columns; have migrations run?"
            )));
        }
        Ok(columns)
    }
}

fn snippet(sql: &str) -> String {
    sql.chars().take(50).collect()
}
