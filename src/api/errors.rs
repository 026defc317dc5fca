use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::attempts::AttemptError;
use crate::services::generation::GenerationError;
use crate::services::grading::GradingError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// The request arrived after the attempt deadline; the attempt has been
    /// submitted as a side effect.
    Gone(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) => {
                let mut response = (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
            ApiError::Forbidden(message)
            | ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message)
            | ApiError::Gone(message) => message,
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Invalid(_)
            | GenerationError::InsufficientQuestions(_)
            | GenerationError::NoUsableQuestions
            | GenerationError::QuestionsNotFound(_) => ApiError::BadRequest(err.to_string()),
            GenerationError::QuestionsForbidden(_) | GenerationError::Forbidden => {
                ApiError::Forbidden(err.to_string())
            }
            GenerationError::NotFound => ApiError::NotFound(err.to_string()),
            GenerationError::Database(err) => ApiError::internal(err, "Failed to generate test"),
        }
    }
}

impl From<AttemptError> for ApiError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::NotFound(message) => ApiError::NotFound(message.to_string()),
            AttemptError::Forbidden(message) => ApiError::Forbidden(message.to_string()),
            AttemptError::Validation(message) => ApiError::BadRequest(message),
            AttemptError::Conflict(message) => ApiError::Conflict(message),
            AttemptError::TimeExpired => ApiError::Gone(err.to_string()),
            AttemptError::Grading(GradingError::ScoreOutOfRange { .. }) => {
                ApiError::BadRequest(err.to_string())
            }
            AttemptError::Internal(message) => ApiError::internal(message, "Attempt operation failed"),
            AttemptError::Database(err) => ApiError::internal(err, "Attempt operation failed"),
        }
    }
}
