//! The module contains the errors the pipeline can raise.
//!
//! Everything is fail-fast: a task error propagates up and fails the
//! enclosing flow. The only deliberate exceptions (per-window skip in the
//! bulk pull, the poll degrading to "no refresh") live at the call sites.
use std::time::Duration;

use sea_orm::DbErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The banking API (or the orchestrator's control API) answered non-2xx.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Bad credentials or a payload for the wrong account.
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("\"{0}\" not found")]
    NotFound(String),
    /// A landing table is missing a column the loader expected. Writing an
    /// ungoverned schema would corrupt staging semantics, so this is fatal
    /// to the current upload task.
    #[error("schema drift: {0}")]
    SchemaDrift(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
