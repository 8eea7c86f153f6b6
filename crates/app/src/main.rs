use std::sync::Arc;
use std::time::Duration;

use engine::{
    MAIN_PIPELINE, OrchestratorClient, Pipelines, RefreshPoller, StarlingClient, WEBHOOK_PIPELINE,
    Warehouse,
};
use migration::{Migrator, MigratorTrait};

mod scheduler;
mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "starpipe={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = sea_orm::Database::connect(settings.warehouse.url.clone()).await?;
    Migrator::up(&db, None).await?;
    let warehouse = Warehouse::new(db);

    let http = reqwest::Client::new();
    let control = settings
        .orchestrator
        .as_ref()
        .map(|o| Arc::new(OrchestratorClient::new(http.clone(), o.url.clone())));

    if let Some(server_settings) = settings.server {
        tracing::info!("Found server settings...");
        let poller = settings.orchestrator.as_ref().map(|o| {
            Arc::new(RefreshPoller::new(
                OrchestratorClient::new(http.clone(), o.url.clone()),
                vec![MAIN_PIPELINE.to_string(), WEBHOOK_PIPELINE.to_string()],
                Duration::from_secs(o.poll_min_interval_secs),
                Duration::from_secs(o.poll_timeout_secs),
            ))
        });
        let state = server::ServerState {
            warehouse: warehouse.clone(),
            account_uid: server_settings.account_uid.clone(),
            control: control.clone(),
            poller,
        };

        tasks.spawn(async move {
            let bind = server_settings
                .bind
                .unwrap_or_else(|| "127.0.0.1".to_string());
            let addr = format!("{}:{}", bind, server_settings.port);
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!("failed to bind server listener: {err}");
                    return;
                }
            };
            if let Err(err) = server::run_with_listener(state, listener).await {
                tracing::error!("server failed: {err}");
            }
        });
    }

    let mut scheduler_fut = None;
    if let Some(scheduler_settings) = settings.scheduler {
        tracing::info!("Found scheduler settings...");
        let starling = StarlingClient::new(
            http.clone(),
            settings.starling.base_url.clone(),
            settings.starling.token.clone(),
        );
        let pipelines = Pipelines::new(
            warehouse.clone(),
            starling,
            scheduler_settings.lookback_months,
        );
        let scheduler = scheduler::Scheduler::new(
            pipelines,
            control.clone(),
            Duration::from_secs(scheduler_settings.main_interval_minutes * 60),
            Duration::from_secs(scheduler_settings.webhook_interval_minutes * 60),
        );
        // The scheduler runs on the main task rather than on the `JoinSet`: its
        // future is built from the async-closure pipeline tree, which the
        // compiler cannot prove `Send` for every lifetime, so it cannot be
        // spawned onto the multi-threaded runtime the way the server task is.
        // Driving it here preserves the original behaviour — server and
        // scheduler run concurrently, and once either stops the other is torn
        // down.
        scheduler_fut = Some(scheduler.run());
    }

    let have_server = !tasks.is_empty();
    match (have_server, scheduler_fut) {
        (false, None) => {}
        (true, None) => {
            tasks.join_next().await;
        }
        (false, Some(scheduler_fut)) => {
            scheduler_fut.await;
        }
        (true, Some(scheduler_fut)) => {
            tokio::select! {
                _ = tasks.join_next() => {}
                _ = scheduler_fut => {}
            }
        }
    }
    tasks.shutdown().await;

    Ok(())
}
