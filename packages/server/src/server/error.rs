//! Maps lifecycle errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::common::LifecycleError;

#[derive(Debug)]
pub enum ApiError {
    Lifecycle(LifecycleError),
    Unauthorized,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        ApiError::Lifecycle(e)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Lifecycle(e) => match e {
                LifecycleError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
                LifecycleError::NotEligible(_) => (StatusCode::UNPROCESSABLE_ENTITY, "not_eligible"),
                LifecycleError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
                LifecycleError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                LifecycleError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                LifecycleError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match &self {
            ApiError::Unauthorized => "missing x-user-email header".to_string(),
            ApiError::Lifecycle(LifecycleError::Store(e)) => {
                error!(error = %e, "Store failure");
                "internal error".to_string()
            }
            ApiError::Lifecycle(e) => e.to_string(),
        };
        (status, Json(ErrorBody { error: code, message })).into_response()
    }
}
