use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::essay_evaluation::EvaluationError;
use crate::services::homework::HomeworkError;
use crate::services::stream_relay::RelayError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status_and_detail(self) -> (StatusCode, String) {
        match self {
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.to_string()),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

impl From<EvaluationError> for ApiError {
    fn from(err: EvaluationError) -> Self {
        match err {
            EvaluationError::UserNotFound => ApiError::NotFound("User not found".to_string()),
            EvaluationError::QuotaExhausted => ApiError::Forbidden("No gradings left"),
            EvaluationError::InProgress => {
                ApiError::Conflict("A grading is already in progress".to_string())
            }
            EvaluationError::NotFound => ApiError::NotFound("Evaluation not found".to_string()),
            EvaluationError::OwnershipLost => {
                ApiError::Conflict("Grading lost its exclusive lease; retry".to_string())
            }
            EvaluationError::Relay(RelayError::Cancelled) => {
                ApiError::ServiceUnavailable("Grading was cancelled".to_string())
            }
            EvaluationError::Relay(err) => ApiError::ServiceUnavailable(err.to_string()),
            EvaluationError::Coordination(err) => {
                tracing::warn!(error = %err, "Coordination store unavailable");
                ApiError::ServiceUnavailable("Grading is temporarily unavailable".to_string())
            }
            EvaluationError::Export(err) => {
                tracing::error!(error = %format!("{err:#}"), "Report export failed");
                ApiError::ServiceUnavailable("Report export failed".to_string())
            }
            EvaluationError::Payload(err) => {
                ApiError::internal(err, "Stored evaluation is unreadable")
            }
            EvaluationError::Repository(err) => ApiError::internal(err, "Failed to load evaluation"),
        }
    }
}

impl From<HomeworkError> for ApiError {
    fn from(err: HomeworkError) -> Self {
        match err {
            HomeworkError::UserNotFound => ApiError::NotFound("User not found".to_string()),
            HomeworkError::Forbidden(message) => ApiError::Forbidden(message),
            HomeworkError::HomeworkNotFound => ApiError::NotFound("Homework not found".to_string()),
            HomeworkError::SubmissionNotFound => {
                ApiError::NotFound("Submission not found".to_string())
            }
            HomeworkError::NotEvaluated => {
                ApiError::Conflict("Submission has not been evaluated yet".to_string())
            }
            HomeworkError::Conflict => {
                ApiError::Conflict("Submission changed concurrently; retry".to_string())
            }
            HomeworkError::NothingToExport => {
                ApiError::BadRequest("None of the submissions has an evaluation".to_string())
            }
            HomeworkError::Transition(err) => ApiError::Conflict(err.to_string()),
            HomeworkError::Export(err) => {
                tracing::error!(error = %format!("{err:#}"), "Report export failed");
                ApiError::ServiceUnavailable("Report export failed".to_string())
            }
            HomeworkError::Payload(err) => ApiError::internal(err, "Stored evaluation is unreadable"),
            HomeworkError::Repository(err) => ApiError::internal(err, "Failed to load submission"),
        }
    }
}
