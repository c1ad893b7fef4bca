//! HTTP-facing error type. Every handler returns `Result<_, ApiError>`; the
//! `IntoResponse` impl turns it into `{ "error": code, "message": .., "details": [..] }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use seating_engine::EngineError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body rejected; one message per problem
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("missing x-user-id header")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    /// Engine refused to run (no confirmed guests, no tables, bad capacity)
    #[error(transparent)]
    Precondition(#[from] EngineError),

    #[error("{0}")]
    Conflict(String),

    #[error("seating generation timed out after {0} ms")]
    Timeout(u128),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Precondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_FAILED",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Precondition(EngineError::NoConfirmedGuests) => "NO_CONFIRMED_GUESTS",
            ApiError::Precondition(EngineError::NoTablesAvailable) => "NO_TABLES_AVAILABLE",
            ApiError::Precondition(EngineError::InvalidCapacity { .. }) => "INVALID_TABLE_CAPACITY",
            ApiError::Precondition(EngineError::DuplicateTableId { .. }) => "DUPLICATE_TABLE_ID",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Timeout(_) => "GENERATION_TIMEOUT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StoreError::VersionConflict { .. } | StoreError::AlreadyExists { .. } => {
                ApiError::Conflict(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Internal(e) => {
                error!(error = %e, "Internal error while handling request");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let details = match &self {
            ApiError::Validation(list) => list.clone(),
            _ => Vec::new(),
        };
        let body = json!({
            "error": self.code(),
            "message": message,
            "details": details,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ApiError::Validation(vec![]).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(EngineError::NoConfirmedGuests).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        let stale = StoreError::VersionConflict { expected: 1, actual: 2 };
        assert_eq!(ApiError::from(stale).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(anyhow::anyhow!("disk on fire")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        use http_body_util::BodyExt;

        let response = ApiError::from(anyhow::anyhow!("secret path /etc/x")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "internal server error");
    }

    #[test]
    fn validation_details_are_listed() {
        let err = ApiError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "validation failed: a; b");
    }
}
