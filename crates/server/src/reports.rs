//! Read-only report endpoints for the dashboard.

use api_types::reports::{BalanceView, CounterpartySpend, ShouldRefresh, SpendingRow, TrendPoint};
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{ServerError, server::ServerState};

#[derive(Deserialize)]
pub struct RangeParams {
    pub from: String,
    pub to: String,
}

#[derive(Deserialize)]
pub struct TrendParams {
    pub from: String,
}

#[derive(Deserialize)]
pub struct SinceParams {
    pub since: DateTime<Utc>,
}

fn check_year_month(value: &str) -> Result<(), ServerError> {
    let ok = value.len() == 7
        && value
            .chars()
            .enumerate()
            .all(|(i, c)| if i == 4 { c == '-' } else { c.is_ascii_digit() });
    if ok {
        Ok(())
    } else {
        Err(ServerError::BadRequest(format!(
            "expected YYYY-MM, got {value:?}"
        )))
    }
}

pub async fn spending(
    State(state): State<ServerState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<SpendingRow>>, ServerError> {
    check_year_month(&params.from)?;
    check_year_month(&params.to)?;
    let rows = engine::reports::spending_summary(&state.warehouse, &params.from, &params.to).await?;
    Ok(Json(rows))
}

pub async fn trend(
    State(state): State<ServerState>,
    Query(params): Query<TrendParams>,
) -> Result<Json<Vec<TrendPoint>>, ServerError> {
    check_year_month(&params.from)?;
    let points = engine::reports::monthly_trend(&state.warehouse, &params.from).await?;
    Ok(Json(points))
}

#[derive(Deserialize)]
pub struct TopParams {
    pub from: String,
    pub to: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    5
}

pub async fn top_counterparties(
    State(state): State<ServerState>,
    Query(params): Query<TopParams>,
) -> Result<Json<Vec<CounterpartySpend>>, ServerError> {
    check_year_month(&params.from)?;
    check_year_month(&params.to)?;
    let rows = engine::reports::top_counterparties(
        &state.warehouse,
        &params.from,
        &params.to,
        params.limit,
    )
    .await?;
    Ok(Json(rows))
}

pub async fn balance(
    State(state): State<ServerState>,
) -> Result<Json<Option<BalanceView>>, ServerError> {
    let snapshot = engine::reports::latest_balance(&state.warehouse).await?;
    Ok(Json(snapshot))
}

/// The dashboard's poll bridge: "has a pipeline finished since my last
/// refresh?". Debounced and soft-failing inside the engine, so this always
/// answers quickly.
pub async fn should_refresh(
    State(state): State<ServerState>,
    Query(params): Query<SinceParams>,
) -> Json<ShouldRefresh> {
    let refresh = match &state.poller {
        Some(poller) => poller.poll(params.since).await,
        None => false,
    };
    Json(ShouldRefresh { refresh })
}
