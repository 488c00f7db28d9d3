//! API error types and JSON error response formatting.
//!
//! Only transport-level problems become `ApiError`. Domain failures inside
//! a turn are reported as `success: false` in a 200 response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use visioneer_agent::AgentError;
use visioneer_core::error::VisioneerError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 400 - missing or invalid parameters.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// 404 - resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// 413 - upload larger than the configured cap.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    /// 500 - unexpected server error. The message is already safe to show.
    #[error("internal error: {0}")]
    Internal(String),
    /// 503 - a collaborator is down or a feature is switched off.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        tracing::warn!(error = %err, "Agent request failed");
        match err {
            AgentError::CatalogUnavailable(_) | AgentError::Storage(_) => {
                ApiError::ServiceUnavailable(err.user_message())
            }
            _ => ApiError::Internal(err.user_message()),
        }
    }
}

impl From<VisioneerError> for ApiError {
    fn from(err: VisioneerError) -> Self {
        tracing::warn!(error = %err, "Storage request failed");
        match err {
            VisioneerError::NotFound(what) => ApiError::NotFound(what),
            _ => ApiError::ServiceUnavailable(
                "The service is temporarily unavailable. Please try again shortly.".to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_agent_error_text_is_not_leaked() {
        let err: ApiError =
            AgentError::CatalogUnavailable("connection refused on 10.0.0.3".to_string()).into();
        match err {
            ApiError::ServiceUnavailable(msg) => assert!(!msg.contains("10.0.0.3")),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn test_storage_error_maps_to_503() {
        let err: ApiError = VisioneerError::Storage("database is locked".to_string()).into();
        match err {
            ApiError::ServiceUnavailable(msg) => assert!(!msg.contains("locked")),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }
}
