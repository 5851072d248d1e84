// src/http/error.rs

//! Mapping of pipeline errors onto HTTP responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::engine::ArtifactFetchError;
use crate::errors::{ErrorKind, ErrorSummary, RenderError};

/// Seconds an overloaded caller is asked to wait before retrying.
pub const RETRY_AFTER_SECS: u64 = 5;

/// An error response: `{"error": {kind, message, field?, retryable}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
}

#[derive(Serialize)]
struct Envelope<'a> {
    error: &'a ErrorBody,
}

/// Status code for each pipeline error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidParameter => StatusCode::BAD_REQUEST,
        ErrorKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => StatusCode::CONFLICT,
        ErrorKind::Spawn
        | ErrorKind::RenderFailure
        | ErrorKind::ArtifactMissing
        | ErrorKind::ArtifactCorrupt
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            status,
            body: ErrorBody {
                kind,
                message: message.into(),
                field: None,
                retryable,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message, false)
    }

    pub fn unknown_job() -> Self {
        Self::new(StatusCode::NOT_FOUND, "unknown_job", "no such job", false)
    }

    /// Details belong in the logs; the body carries a fixed message.
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal.as_str(),
            "internal error",
            false,
        )
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind
    }
}

impl From<ErrorSummary> for ApiError {
    fn from(summary: ErrorSummary) -> Self {
        Self {
            status: status_for(summary.kind),
            body: ErrorBody {
                kind: summary.kind.as_str(),
                message: summary.message,
                field: summary.field,
                retryable: summary.retryable,
            },
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError::from(err.summary())
    }
}

impl From<ArtifactFetchError> for ApiError {
    fn from(err: ArtifactFetchError) -> Self {
        match err {
            ArtifactFetchError::UnknownJob => ApiError::unknown_job(),
            ArtifactFetchError::NotReady(_) => {
                ApiError::new(StatusCode::CONFLICT, "not_ready", err.to_string(), true)
            }
            ArtifactFetchError::AlreadyDelivered | ArtifactFetchError::Expired => {
                ApiError::new(StatusCode::GONE, "gone", err.to_string(), false)
            }
            ArtifactFetchError::Failed(summary) => ApiError::from(summary),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(Envelope { error: &self.body })).into_response();
        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::JobState;

    #[test]
    fn every_kind_has_a_status() {
        assert_eq!(status_for(ErrorKind::InvalidParameter), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Overloaded), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::TimedOut), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::Cancelled), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::ArtifactMissing), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn overload_sets_retry_after() {
        let response = ApiError::from(RenderError::Overloaded {
            running: 1,
            queued: 0,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from(RETRY_AFTER_SECS)
        );
    }

    #[tokio::test]
    async fn failure_bodies_carry_no_exit_code() {
        let response = ApiError::from(RenderError::RenderFailure {
            exit_code: Some(137),
            stderr_tail: "Killed".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("render_failure"), "{text}");
        assert!(!text.contains("137"), "{text}");
        assert!(!text.contains("Killed"), "{text}");

        let response = ApiError::internal().into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("\"internal error\""));
    }

    #[test]
    fn fetch_errors_map_to_polling_statuses() {
        assert_eq!(ApiError::from(ArtifactFetchError::UnknownJob).status, StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(ArtifactFetchError::NotReady(JobState::Running)).status,
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::from(ArtifactFetchError::AlreadyDelivered).status, StatusCode::GONE);
        assert_eq!(ApiError::from(ArtifactFetchError::Expired).status, StatusCode::GONE);
    }

    #[test]
    fn invalid_parameter_keeps_field() {
        let err = ApiError::from(RenderError::invalid("chest", "must be between 40 and 200 cm"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.kind, "invalid_parameter");
        assert_eq!(err.body.field.as_deref(), Some("chest"));
    }
}
