//! Jovey API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jovey_core::error::DomainError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Trace exporter could not be set up.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// Event already stored under a repeated idempotency key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_event_id: Option<Uuid>,
}

/// HTTP-layer error that implements `IntoResponse`.
#[derive(Debug)]
pub enum ApiError {
    /// A domain error from a handler.
    Domain(DomainError),
    /// Missing or invalid bearer token.
    Unauthorized(String),
    /// Authenticated, but the role may not use this route.
    Forbidden(String),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, existing_event_id) = match &self {
            Self::Domain(DomainError::EventNotFound(_)) => {
                (StatusCode::NOT_FOUND, "event_not_found", None)
            }
            Self::Domain(DomainError::DuplicateIdempotencyKey {
                existing_event_id, ..
            }) => (
                StatusCode::CONFLICT,
                "idempotency_conflict",
                Some(*existing_event_id),
            ),
            Self::Domain(DomainError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error", None)
            }
            Self::Domain(DomainError::ConstraintViolation(_)) => {
                (StatusCode::CONFLICT, "constraint_violation", None)
            }
            Self::Domain(DomainError::Infrastructure(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "infrastructure_error",
                None,
            ),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", None),
        };

        let message = match self {
            Self::Domain(DomainError::Infrastructure(detail)) => {
                tracing::error!(error = %detail, "request failed on storage");
                "internal storage error".to_owned()
            }
            Self::Domain(err) => err.to_string(),
            Self::Unauthorized(msg) | Self::Forbidden(msg) => msg,
        };

        let body = ErrorBody {
            error,
            message,
            existing_event_id,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_event_not_found_maps_to_404() {
        assert_eq!(
            status_of(DomainError::EventNotFound(Uuid::new_v4()).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_duplicate_key_maps_to_409_with_existing_id() {
        // Arrange
        let existing_event_id = Uuid::new_v4();
        let err = ApiError::from(DomainError::DuplicateIdempotencyKey {
            key: "checkout-1".into(),
            existing_event_id,
        });

        // Act
        let response = err.into_response();

        // Assert
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "idempotency_conflict");
        assert_eq!(json["existing_event_id"], existing_event_id.to_string());
    }

    #[test]
    fn test_validation_maps_to_400() {
        assert_eq!(
            status_of(DomainError::Validation("bad input".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_constraint_violation_maps_to_409() {
        assert_eq!(
            status_of(DomainError::ConstraintViolation("products_sku_key".into()).into()),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_infrastructure_maps_to_500_without_leaking_detail() {
        let response =
            ApiError::from(DomainError::Infrastructure("password=hunter2".into())).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains("hunter2"));
    }

    #[test]
    fn test_auth_errors_map_to_401_and_403() {
        assert_eq!(
            status_of(ApiError::Unauthorized("missing token".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ApiError::Forbidden("staff only".into())),
            StatusCode::FORBIDDEN
        );
    }
}
