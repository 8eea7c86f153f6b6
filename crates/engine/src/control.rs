//! Client for the external orchestrator's control API.
//!
//! The scheduling runtime itself is out of scope; this talks to its REST
//! surface: deployments are addressed as `<flow-name>/<pipeline-name>`, runs
//! can be created and have their state set, and recent runs can be listed
//! (which is what the refresh poll reads).
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::PipelineError;

#[derive(Clone, Debug, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateType {
    Scheduled,
    Pending,
    Running,
    Completed,
    Failed,
    Crashed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunState {
    #[serde(rename = "type")]
    pub state_type: StateType,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FlowRun {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<RunState>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expected_start_time: Option<DateTime<Utc>>,
}

impl FlowRun {
    pub fn is_completed(&self) -> bool {
        matches!(
            self.state.as_ref().map(|s| s.state_type),
            Some(StateType::Completed)
        )
    }
}

#[derive(Clone, Debug)]
pub struct OrchestratorClient {
    client: Client,
    base_url: String,
}

impl OrchestratorClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, PipelineError> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream(format!("{status}: {text}")));
        }
        Ok(resp.json().await?)
    }

    /// Lists all deployments the runtime knows about.
    pub async fn deployments(&self) -> Result<Vec<Deployment>, PipelineError> {
        self.post_json("/api/deployments/filter", &json!({})).await
    }

    /// Resolves a deployment by its `<flow-name>/<pipeline-name>` path.
    pub async fn deployment_by_name(&self, name: &str) -> Result<Deployment, PipelineError> {
        let resp = self
            .client
            .get(self.url(&format!("/api/deployments/name/{name}")))
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PipelineError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream(format!("{status}: {text}")));
        }
        Ok(resp.json().await?)
    }

    /// Creates a run for a deployment.
    pub async fn create_run(&self, deployment_id: &str) -> Result<FlowRun, PipelineError> {
        self.post_json(
            &format!("/api/deployments/{deployment_id}/create_flow_run"),
            &json!({}),
        )
        .await
    }

    /// Records a run's state transition.
    pub async fn set_run_state(
        &self,
        run_id: &str,
        state_type: StateType,
    ) -> Result<(), PipelineError> {
        let resp = self
            .client
            .post(self.url(&format!("/api/flow_runs/{run_id}/set_state")))
            .json(&json!({ "state": { "type": state_type } }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream(format!("{status}: {text}")));
        }
        Ok(())
    }

    /// Most recent runs of a deployment, expected start time descending.
    pub async fn recent_runs(
        &self,
        deployment_id: &str,
        limit: u64,
    ) -> Result<Vec<FlowRun>, PipelineError> {
        self.post_json(
            "/api/flow_runs/filter",
            &json!({
                "deployments": { "id": { "any_": [deployment_id] } },
                "sort": "EXPECTED_START_TIME_DESC",
                "limit": limit,
            }),
        )
        .await
    }

    /// Requests a run of `<flow_name>/<pipeline_name>`, bounded by `timeout`.
    ///
    /// Unlike the refresh poll, a timeout here is a hard error: the caller
    /// asked for work to be scheduled and must know it was not.
    pub async fn trigger_pipeline(
        &self,
        flow_name: &str,
        pipeline_name: &str,
        timeout: Duration,
    ) -> Result<FlowRun, PipelineError> {
        let path = format!("{flow_name}/{pipeline_name}");
        let trigger = async {
            let deployment = self.deployment_by_name(&path).await?;
            tracing::info!(deployment = %deployment.name, id = %deployment.id, "triggering pipeline run");
            self.create_run(&deployment.id).await
        };
        match tokio::time::timeout(timeout, trigger).await {
            Ok(result) => {
                if let Ok(run) = &result {
                    tracing::info!(run_id = %run.id, deployment = %path, "created flow run");
                }
                result
            }
            Err(_) => {
                tracing::error!(deployment = %path, ?timeout, "pipeline trigger timed out");
                Err(PipelineError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_types_deserialize_from_screaming_case() {
        let run: FlowRun = serde_json::from_value(serde_json::json!({
            "id": "run-1",
            "state": { "type": "COMPLETED" },
            "end_time": "2025-11-26T12:00:00Z"
        }))
        .unwrap();
        assert!(run.is_completed());
    }

    #[test]
    fn unknown_state_types_do_not_fail_parsing() {
        let run: FlowRun = serde_json::from_value(serde_json::json!({
            "id": "run-2",
            "state": { "type": "SOME_FUTURE_STATE" }
        }))
        .unwrap();
        assert!(!run.is_completed());
    }
}
