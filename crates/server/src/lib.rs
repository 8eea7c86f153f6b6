use api_types::webhook::FieldError;
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

pub use server::{ServerState, router, run_with_listener, spawn_with_listener};

mod reports;
mod server;
mod webhook;

/// Errors surfaced to webhook callers and report readers.
///
/// Callers get a precise status plus a structured body; internal detail is
/// logged at the failure site, never echoed.
pub enum ServerError {
    /// Unparseable request (not JSON, bad query parameter).
    BadRequest(String),
    /// Payload failed the schema check; carries per-field errors.
    Validation(Vec<FieldError>),
    /// Payload is for an account this deployment does not own.
    Unauthorized,
    /// Anything else; the body stays generic.
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ValidationBody {
    status: &'static str,
    errors: Vec<FieldError>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ServerError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    status: "error",
                    message,
                }),
            )
                .into_response(),
            ServerError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ValidationBody {
                    status: "error",
                    errors,
                }),
            )
                .into_response(),
            ServerError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody {
                    status: "error",
                    message: "invalid account uid".to_string(),
                }),
            )
                .into_response(),
            ServerError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    status: "error",
                    message: "internal server error".to_string(),
                }),
            )
                .into_response(),
        }
    }
}

impl From<engine::PipelineError> for ServerError {
    fn from(err: engine::PipelineError) -> Self {
        tracing::error!(error = %err, "internal failure while handling request");
        Self::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let res = ServerError::BadRequest("no JSON payload provided".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn validation_maps_to_422() {
        let res = ServerError::Validation(vec![FieldError {
            field: "content.feedItemUid".to_string(),
            message: "required field is missing".to_string(),
        }])
        .into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let res = ServerError::Unauthorized.into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn internal_maps_to_500_with_generic_body() {
        let res = ServerError::Internal.into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
