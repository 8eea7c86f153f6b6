//! Core of the Starling → warehouse ingestion pipeline.
//!
//! Bulk pulls land raw API records in the `lnd` schema; webhook events are
//! upserted there by the server crate; the staging merger reconciles both
//! streams into canonical `stg` tables; flows sequence the steps into the
//! two top-level pipelines; the reports module reads staging for the
//! dashboard, and the poll module tells the dashboard when to refresh.
pub use control::{Deployment, FlowRun, OrchestratorClient, RunState, StateType};
pub use error::PipelineError;
pub use flows::{
    DEFAULT_LOOKBACK_MONTHS, FlowPolicy, MAIN_PIPELINE, Pipelines, WEBHOOK_PIPELINE, run_flow,
};
pub use poll::RefreshPoller;
pub use starling::StarlingClient;
pub use warehouse::Warehouse;

pub mod calendar;
mod control;
mod error;
mod flows;
pub mod landing;
pub mod money;
pub mod poll;
pub mod reports;
pub mod staging;
mod starling;
mod warehouse;
