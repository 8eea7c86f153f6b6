//! Flow and pipeline definitions.
//!
//! Flows compose as a tree: leaf flows (refresh one landing table, insert
//! one staging table) compose into per-entity DAGs, which compose into the
//! two top-level pipelines. Every flow carries an explicit [`FlowPolicy`];
//! exceeding the timeout is a fatal run failure. Flows are idempotent by
//! construction (truncate-then-reload or watermark-upsert), so re-running
//! after a failure is always safe.
use std::time::Duration;

use chrono::{Months, Utc};

use crate::calendar;
use crate::error::PipelineError;
use crate::landing::{
    self, BALANCE_TABLE, SPACES_TABLE, TRANSACTIONS_API_PULL_TABLE,
};
use crate::staging;
use crate::starling::StarlingClient;
use crate::warehouse::Warehouse;

pub const MAIN_PIPELINE: &str = "main-pipeline";
pub const WEBHOOK_PIPELINE: &str = "webhook-pipeline";

pub const DEFAULT_LOOKBACK_MONTHS: u32 = 13;

/// Execution policy for one flow. Retries default to zero: the core is
/// fail-fast, and retry is the external scheduler's decision to make.
#[derive(Clone, Copy, Debug)]
pub struct FlowPolicy {
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_backoff: Duration,
}

impl FlowPolicy {
    pub const fn with_timeout(secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(secs),
            retry_count: 0,
            retry_backoff: Duration::from_secs(0),
        }
    }
}

/// Runs one flow under its policy: bounded by the timeout, retried per the
/// policy, logged start to end. Errors propagate so the enclosing flow (and
/// ultimately the run) fails visibly.
pub async fn run_flow<T, F>(name: &str, policy: FlowPolicy, mut op: F) -> Result<T, PipelineError>
where
    F: AsyncFnMut() -> Result<T, PipelineError>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        tracing::info!(flow = name, attempt, "flow started");
        let err = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(value)) => {
                tracing::info!(flow = name, "flow completed");
                return Ok(value);
            }
            Ok(Err(err)) => err,
            Err(_) => PipelineError::Timeout(policy.timeout),
        };
        tracing::error!(flow = name, attempt, error = %err, "flow failed");
        if attempt > policy.retry_count {
            return Err(err);
        }
        tokio::time::sleep(policy.retry_backoff).await;
    }
}

/// The pipeline tree over one warehouse and one bank account.
#[derive(Clone, Debug)]
pub struct Pipelines {
    warehouse: Warehouse,
    starling: StarlingClient,
    lookback_months: u32,
}

impl Pipelines {
    pub fn new(warehouse: Warehouse, starling: StarlingClient, lookback_months: u32) -> Self {
        Self {
            warehouse,
            starling,
            lookback_months,
        }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// Pulls the lookback span month by month into the landing table.
    ///
    /// Best-effort by policy: a failed window is logged and skipped, so a
    /// partial-failure run still yields partial data. Each window commits on
    /// its own, so a later timeout cannot lose earlier months. Only schema
    /// drift (landing table missing) aborts the task.
    async fn upload_transactions(&self, account_uid: &str) -> Result<(), PipelineError> {
        let to = Utc::now();
        let from = to
            .checked_sub_months(Months::new(self.lookback_months))
            .unwrap_or(to);
        let columns = landing::columns(&self.warehouse, TRANSACTIONS_API_PULL_TABLE).await?;

        for (window_from, window_to) in calendar::monthly_windows(from, to) {
            let items = match self
                .starling
                .settled_transactions_between(account_uid, window_from, window_to)
                .await
            {
                Ok(items) => items,
                Err(err) => {
                    tracing::error!(
                        %window_from, %window_to, error = %err,
                        "transaction window failed, skipping"
                    );
                    continue;
                }
            };
            if items.is_empty() {
                continue;
            }

            let rows: Vec<_> = items.iter().map(landing::flatten).collect();
            match landing::insert_rows(
                &self.warehouse,
                TRANSACTIONS_API_PULL_TABLE,
                &columns,
                &rows,
            )
            .await
            {
                Ok(count) => {
                    tracing::info!(%window_from, %window_to, count, "uploaded transaction window");
                }
                Err(err) => {
                    tracing::error!(
                        %window_from, %window_to, error = %err,
                        "transaction window upload failed, skipping"
                    );
                }
            }
        }
        Ok(())
    }

    async fn upload_spaces(&self, account_uid: &str) -> Result<(), PipelineError> {
        let columns = landing::columns(&self.warehouse, SPACES_TABLE).await?;
        let spaces = self.starling.spaces(account_uid).await?;
        if spaces.is_empty() {
            return Err(PipelineError::Upstream("no spaces data found".to_string()));
        }
        let rows: Vec<_> = spaces.iter().map(landing::flatten).collect();
        let count = landing::insert_rows(&self.warehouse, SPACES_TABLE, &columns, &rows).await?;
        tracing::info!(count, "uploaded spaces");
        Ok(())
    }

    async fn upload_balance(&self, account_uid: &str) -> Result<(), PipelineError> {
        let columns = landing::columns(&self.warehouse, BALANCE_TABLE).await?;
        let balance = self.starling.balance(account_uid).await?;
        let row = landing::flatten(&balance);
        if row.is_empty() {
            return Err(PipelineError::Upstream("no balance data found".to_string()));
        }
        landing::insert_rows(&self.warehouse, BALANCE_TABLE, &columns, &[row]).await?;
        tracing::info!("uploaded balance snapshot");
        Ok(())
    }

    // Leaf flows.

    pub async fn refresh_landing_transactions(&self) -> Result<(), PipelineError> {
        run_flow(
            "refresh-landing-transactions",
            FlowPolicy::with_timeout(180),
            async || {
                let lnd = self.warehouse.landing(TRANSACTIONS_API_PULL_TABLE);
                self.warehouse
                    .execute_raw(
                        &self.warehouse.truncate_sql(&lnd),
                        "truncate landing transactions",
                    )
                    .await?;
                let account_uid = self.starling.account_uid().await?;
                self.upload_transactions(&account_uid).await
            },
        )
        .await
    }

    pub async fn insert_transactions_to_staging(&self) -> Result<(), PipelineError> {
        run_flow(
            "insert-transactions-to-staging-api",
            FlowPolicy::with_timeout(180),
            async || staging::refresh_transactions(&self.warehouse).await,
        )
        .await
    }

    pub async fn refresh_landing_spaces(&self) -> Result<(), PipelineError> {
        run_flow(
            "refresh-landing-spaces",
            FlowPolicy::with_timeout(180),
            async || {
                let account_uid = self.starling.account_uid().await?;
                let lnd = self.warehouse.landing(SPACES_TABLE);
                self.warehouse
                    .execute_raw(&self.warehouse.truncate_sql(&lnd), "truncate landing spaces")
                    .await?;
                self.upload_spaces(&account_uid).await
            },
        )
        .await
    }

    pub async fn insert_spaces_to_staging(&self) -> Result<(), PipelineError> {
        run_flow(
            "insert-spaces-to-staging",
            FlowPolicy::with_timeout(180),
            async || staging::refresh_spaces(&self.warehouse).await,
        )
        .await
    }

    pub async fn refresh_landing_balance(&self) -> Result<(), PipelineError> {
        run_flow(
            "refresh-lnd-balance",
            FlowPolicy::with_timeout(180),
            async || {
                let account_uid = self.starling.account_uid().await?;
                let lnd = self.warehouse.landing(BALANCE_TABLE);
                self.warehouse
                    .execute_raw(&self.warehouse.truncate_sql(&lnd), "truncate landing balance")
                    .await?;
                self.upload_balance(&account_uid).await
            },
        )
        .await
    }

    pub async fn insert_balance_to_staging(&self) -> Result<(), PipelineError> {
        run_flow(
            "insert-balance-to-staging",
            FlowPolicy::with_timeout(180),
            async || staging::refresh_balance(&self.warehouse).await,
        )
        .await
    }

    pub async fn merge_webhook_to_staging(&self) -> Result<(), PipelineError> {
        run_flow(
            "insert-transactions-to-staging-webhook",
            FlowPolicy::with_timeout(60),
            async || {
                let rows = staging::merge_webhook_transactions(&self.warehouse).await?;
                tracing::info!(rows, "webhook rows merged into staging");
                Ok(())
            },
        )
        .await
    }

    // Per-entity DAGs: refresh landing, then insert to staging.

    pub async fn transactions_dag(&self) -> Result<(), PipelineError> {
        run_flow(
            "pipe-transactions-lnd-to-stg-api",
            FlowPolicy::with_timeout(360),
            async || {
                self.refresh_landing_transactions().await?;
                self.insert_transactions_to_staging().await
            },
        )
        .await
    }

    pub async fn spaces_dag(&self) -> Result<(), PipelineError> {
        run_flow(
            "pipe-spaces-lnd-to-stg",
            FlowPolicy::with_timeout(360),
            async || {
                self.refresh_landing_spaces().await?;
                self.insert_spaces_to_staging().await
            },
        )
        .await
    }

    pub async fn balance_dag(&self) -> Result<(), PipelineError> {
        run_flow(
            "pipe-balance-lnd-to-stg",
            FlowPolicy::with_timeout(360),
            async || {
                self.refresh_landing_balance().await?;
                self.insert_balance_to_staging().await
            },
        )
        .await
    }

    // Top-level pipelines.

    /// Full refresh of everything; scheduled periodically.
    pub async fn main_pipeline(&self) -> Result<(), PipelineError> {
        run_flow(MAIN_PIPELINE, FlowPolicy::with_timeout(7200), async || {
            self.transactions_dag().await?;
            self.balance_dag().await?;
            self.spaces_dag().await
        })
        .await
    }

    /// Triggered on webhook arrival, and run on its own schedule as a
    /// safety net.
    pub async fn webhook_pipeline(&self) -> Result<(), PipelineError> {
        run_flow(WEBHOOK_PIPELINE, FlowPolicy::with_timeout(1800), async || {
            self.balance_dag().await?;
            self.spaces_dag().await?;
            self.merge_webhook_to_staging().await
        })
        .await
    }
}
