//! Refresh notifier: the poll protocol that lets the read-only dashboard
//! learn that a pipeline run completed after its last refresh, without a
//! push channel of its own.
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::control::{FlowRun, OrchestratorClient};
use crate::error::PipelineError;

/// How many recent runs per pipeline the check inspects.
pub const RECENT_RUN_LIMIT: u64 = 5;

/// The pure poll decision: true iff some run is in a completed state and
/// ended strictly after `since`.
#[must_use]
pub fn any_completed_after(runs: &[FlowRun], since: DateTime<Utc>) -> bool {
    runs.iter()
        .any(|run| run.is_completed() && run.end_time.is_some_and(|end| end > since))
}

/// Checks whether any of the named pipelines completed a run after `since`.
///
/// The whole check is bounded by `timeout`; on timeout it degrades to
/// `false` (no refresh) rather than blocking the dashboard — availability
/// over freshness.
pub async fn should_refresh(
    control: &OrchestratorClient,
    pipeline_names: &[&str],
    since: DateTime<Utc>,
    timeout: Duration,
) -> Result<bool, PipelineError> {
    let check = async {
        let deployments = control.deployments().await?;
        let matching: Vec<_> = deployments
            .into_iter()
            .filter(|d| pipeline_names.contains(&d.name.as_str()))
            .collect();
        if matching.is_empty() {
            tracing::warn!(?pipeline_names, "no deployments match the poll filter");
            return Ok(false);
        }

        for deployment in matching {
            let runs = control.recent_runs(&deployment.id, RECENT_RUN_LIMIT).await?;
            if any_completed_after(&runs, since) {
                tracing::info!(deployment = %deployment.name, %since, "found completed run, refresh needed");
                return Ok(true);
            }
        }
        tracing::debug!(?pipeline_names, %since, "no completed runs after watermark");
        Ok(false)
    };

    match tokio::time::timeout(timeout, check).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(?timeout, ?pipeline_names, "refresh poll timed out");
            Ok(false)
        }
    }
}

/// Debounced wrapper around [`should_refresh`].
///
/// The dashboard re-polls aggressively; live checks are rate-limited to one
/// per `min_interval`, and any failure degrades to "no refresh needed".
pub struct RefreshPoller {
    control: OrchestratorClient,
    pipeline_names: Vec<String>,
    min_interval: Duration,
    timeout: Duration,
    last_check: Mutex<Option<Instant>>,
}

impl RefreshPoller {
    pub fn new(
        control: OrchestratorClient,
        pipeline_names: Vec<String>,
        min_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            control,
            pipeline_names,
            min_interval,
            timeout,
            last_check: Mutex::new(None),
        }
    }

    /// Runs a debounced check. Inside the debounce window (or on any
    /// failure) this reports `false`.
    pub async fn poll(&self, since: DateTime<Utc>) -> bool {
        if !self.mark_check() {
            return false;
        }

        let names: Vec<&str> = self.pipeline_names.iter().map(String::as_str).collect();
        match should_refresh(&self.control, &names, since, self.timeout).await {
            Ok(refresh) => refresh,
            Err(err) => {
                tracing::error!(error = %err, "refresh poll failed");
                false
            }
        }
    }

    /// Records a check attempt; false when still inside the debounce window.
    fn mark_check(&self) -> bool {
        let now = Instant::now();
        let Ok(mut last) = self.last_check.lock() else {
            return false;
        };
        if let Some(previous) = *last {
            if now.duration_since(previous) < self.min_interval {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{RunState, StateType};

    fn run(state: Option<StateType>, end_time: Option<&str>) -> FlowRun {
        FlowRun {
            id: "run".to_string(),
            name: None,
            state: state.map(|state_type| RunState { state_type }),
            end_time: end_time.map(|s| {
                DateTime::parse_from_rfc3339(s)
                    .unwrap()
                    .with_timezone(&Utc)
            }),
            expected_start_time: None,
        }
    }

    fn since() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-11-26T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn empty_run_list_means_no_refresh() {
        assert!(!any_completed_after(&[], since()));
    }

    #[test]
    fn completed_run_after_watermark_triggers_refresh() {
        let runs = vec![run(Some(StateType::Completed), Some("2025-11-26T12:05:00Z"))];
        assert!(any_completed_after(&runs, since()));
    }

    #[test]
    fn older_runs_do_not_trigger_refresh() {
        let runs = vec![run(Some(StateType::Completed), Some("2025-11-26T11:55:00Z"))];
        assert!(!any_completed_after(&runs, since()));
    }

    #[test]
    fn end_time_equal_to_watermark_is_not_newer() {
        let runs = vec![run(Some(StateType::Completed), Some("2025-11-26T12:00:00Z"))];
        assert!(!any_completed_after(&runs, since()));
    }

    #[test]
    fn incomplete_or_stateless_runs_do_not_count() {
        let runs = vec![
            run(Some(StateType::Running), Some("2025-11-26T12:05:00Z")),
            run(Some(StateType::Failed), Some("2025-11-26T12:05:00Z")),
            run(None, Some("2025-11-26T12:05:00Z")),
            run(Some(StateType::Completed), None),
        ];
        assert!(!any_completed_after(&runs, since()));
    }
}
