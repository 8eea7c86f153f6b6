//! Client for the Starling Bank open API.
//!
//! Thin I/O plumbing: bearer-token GETs returning raw JSON, with non-2xx
//! responses mapped onto the pipeline error taxonomy. The caller decides what
//! to do with a failure (the bulk pull skips a failed month and continues).
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::PipelineError;

#[derive(Clone, Debug)]
pub struct StarlingClient {
    client: Client,
    base_url: String,
    token: String,
}

impl StarlingClient {
    pub fn new(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, PipelineError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PipelineError::Auth(format!("{status} from {path}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, path, body = %body, "starling api error");
            return Err(PipelineError::Upstream(format!("{status}: {body}")));
        }
        Ok(resp.json().await?)
    }

    /// Returns the raw account list.
    pub async fn accounts(&self) -> Result<Vec<Value>, PipelineError> {
        let body = self.get_json("/api/v2/accounts", &[]).await?;
        match body.get("accounts").and_then(Value::as_array) {
            Some(accounts) => Ok(accounts.clone()),
            None => Err(PipelineError::Upstream(
                "account response missing accounts list".to_string(),
            )),
        }
    }

    /// Returns one detail of the primary account, e.g. `accountUid`.
    pub async fn account_detail(&self, detail: &str) -> Result<String, PipelineError> {
        let accounts = self.accounts().await?;
        let first = accounts
            .first()
            .ok_or_else(|| PipelineError::NotFound("account".to_string()))?;
        first
            .get(detail)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::NotFound(detail.to_string()))
    }

    pub async fn account_uid(&self) -> Result<String, PipelineError> {
        self.account_detail("accountUid").await
    }

    /// Settled transactions in `[from, to)` for one account.
    pub async fn settled_transactions_between(
        &self,
        account_uid: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Value>, PipelineError> {
        let path = format!("/api/v2/feed/account/{account_uid}/settled-transactions-between");
        let query = [
            ("minTransactionTimestamp", iso_millis(from)),
            ("maxTransactionTimestamp", iso_millis(to)),
        ];
        let body = self.get_json(&path, &query).await?;
        Ok(body
            .get("feedItems")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Savings spaces for one account.
    pub async fn spaces(&self, account_uid: &str) -> Result<Vec<Value>, PipelineError> {
        let path = format!("/api/v2/account/{account_uid}/spaces");
        let body = self.get_json(&path, &[]).await?;
        Ok(body
            .get("savingsGoals")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Current balance snapshot for one account.
    pub async fn balance(&self, account_uid: &str) -> Result<Value, PipelineError> {
        let path = format!("/api/v2/accounts/{account_uid}/balance");
        self.get_json(&path, &[]).await
    }
}

fn iso_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_use_millisecond_zulu_format() {
        let ts = DateTime::parse_from_rfc3339("2025-11-26T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(iso_millis(ts), "2025-11-26T12:00:00.000Z");
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = StarlingClient::new(Client::new(), "https://api.example.com/", "token");
        assert_eq!(
            client.url("/api/v2/accounts"),
            "https://api.example.com/api/v2/accounts"
        );
    }
}
