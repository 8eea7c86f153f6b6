//! In-process scheduler: runs the two pipelines on their configured cadence.
//!
//! `main-pipeline` does the periodic full refresh; `webhook-pipeline` runs on
//! its own shorter interval as a safety net for triggers that never arrived.
//! When an orchestrator is configured, each execution is recorded in its run
//! history (create run → RUNNING → COMPLETED/FAILED) so the dashboard's
//! refresh poll can see it. Recording is best-effort: the data run has
//! already committed, so a control-API failure is logged, never re-raised.
use std::sync::Arc;
use std::time::Duration;

use engine::{MAIN_PIPELINE, OrchestratorClient, Pipelines, StateType, WEBHOOK_PIPELINE};
use tokio::time::MissedTickBehavior;

pub struct Scheduler {
    pipelines: Pipelines,
    control: Option<Arc<OrchestratorClient>>,
    main_every: Duration,
    webhook_every: Duration,
}

impl Scheduler {
    pub fn new(
        pipelines: Pipelines,
        control: Option<Arc<OrchestratorClient>>,
        main_every: Duration,
        webhook_every: Duration,
    ) -> Self {
        Self {
            pipelines,
            control,
            main_every,
            webhook_every,
        }
    }

    pub async fn run(self) {
        let mut main_tick = tokio::time::interval(self.main_every);
        main_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut webhook_tick = tokio::time::interval(self.webhook_every);
        webhook_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // interval() fires immediately, so both pipelines also run once at
        // startup; they are idempotent, so that is safe.
        loop {
            tokio::select! {
                _ = main_tick.tick() => self.execute(MAIN_PIPELINE).await,
                _ = webhook_tick.tick() => self.execute(WEBHOOK_PIPELINE).await,
            }
        }
    }

    async fn execute(&self, pipeline: &str) {
        let run_id = self.record_start(pipeline).await;

        let result = match pipeline {
            MAIN_PIPELINE => self.pipelines.main_pipeline().await,
            _ => self.pipelines.webhook_pipeline().await,
        };

        let state = match &result {
            Ok(()) => StateType::Completed,
            Err(err) => {
                tracing::error!(pipeline, error = %err, "pipeline run failed");
                StateType::Failed
            }
        };
        self.record_end(run_id, state).await;
    }

    async fn record_start(&self, pipeline: &str) -> Option<String> {
        let control = self.control.as_ref()?;
        let path = format!("{pipeline}/{pipeline}");
        let run = async {
            let deployment = control.deployment_by_name(&path).await?;
            let run = control.create_run(&deployment.id).await?;
            control.set_run_state(&run.id, StateType::Running).await?;
            Ok::<_, engine::PipelineError>(run)
        }
        .await;

        match run {
            Ok(run) => Some(run.id),
            Err(err) => {
                tracing::warn!(pipeline, error = %err, "could not record run start");
                None
            }
        }
    }

    async fn record_end(&self, run_id: Option<String>, state: StateType) {
        let (Some(control), Some(run_id)) = (self.control.as_ref(), run_id) else {
            return;
        };
        if let Err(err) = control.set_run_state(&run_id, state).await {
            tracing::warn!(%run_id, error = %err, "could not record run end");
        }
    }
}
