use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, services::track_supply::SupplyError, state::engine::Rejection};

/// Message returned when a write lost the race twice in a row.
pub const STALE_STATE_MESSAGE: &str = "state changed, please refresh";

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The state moved on while the request was being applied.
    #[error("{0}")]
    Conflict(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { .. } => ServiceError::Conflict(STALE_STATE_MESSAGE.into()),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<Rejection> for ServiceError {
    fn from(err: Rejection) -> Self {
        if err.is_input_error() {
            ServiceError::InvalidInput(err.to_string())
        } else {
            ServiceError::InvalidState(format!("{err}; try again"))
        }
    }
}

impl From<SupplyError> for ServiceError {
    fn from(err: SupplyError) -> Self {
        match err {
            SupplyError::InvalidSource(_) | SupplyError::Format { .. } => {
                ServiceError::InvalidInput(err.to_string())
            }
            SupplyError::Read { .. } => ServiceError::InvalidInput(format!(
                "{err}; the match stays in the lobby"
            )),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_conflict_asks_for_a_refresh() {
        let err: ServiceError = StorageError::Conflict {
            expected: Some(1),
            actual: Some(2),
        }
        .into();
        assert!(matches!(&err, ServiceError::Conflict(message) if message == STALE_STATE_MESSAGE));

        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn rejections_map_to_bad_request_or_conflict() {
        let input: AppError = ServiceError::from(Rejection::EmptyName).into();
        assert_eq!(input.into_response().status(), StatusCode::BAD_REQUEST);

        let state: AppError = ServiceError::from(Rejection::GuessAlreadyPending).into();
        assert_eq!(state.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn degraded_mode_is_service_unavailable() {
        let err: AppError = ServiceError::Degraded.into();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
