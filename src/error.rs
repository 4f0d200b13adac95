use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::messages;

/// 4xx系のバリアントはユーザー向けメッセージをそのまま保持する。
/// 5xx系は内部の詳細を保持し、レスポンスには汎用メッセージを返す。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Validation error on `{field}`: {message}")]
    FieldError { field: &'static str, message: String },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("External service error: {0}")]
    ExternalServiceError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Hashing error: {0}")]
    HashingError(String),
    #[error("Environment error: {0}")]
    EnvironmentError(String),
}

impl AppError {
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        AppError::FieldError {
            field,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::FieldError { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ExternalServiceError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_)
            | AppError::HashingError(_)
            | AppError::EnvironmentError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::DatabaseError(e.to_string())
    }
}

// 抽出失敗も同じエラー形式で返す
impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        tracing::debug!(error = %e, "rejected JSON body");
        AppError::ValidationError(messages::BAD_REQUEST.to_string())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        tracing::debug!(error = %e, "rejected query string");
        AppError::ValidationError(messages::BAD_REQUEST.to_string())
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        tracing::debug!(error = %e, "rejected path parameter");
        AppError::NotFound(messages::NOT_FOUND.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // サーバー側の詳細はログにのみ残す
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }

        let (message, field) = match self {
            AppError::FieldError { field, message } => (message, Some(field)),
            AppError::ValidationError(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::RateLimited(msg) => (msg, None),
            AppError::ExternalServiceError(_)
            | AppError::DatabaseError(_)
            | AppError::HashingError(_)
            | AppError::EnvironmentError(_) => {
                (messages::for_status(status.as_u16()).to_string(), None)
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                field,
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_categories() {
        assert_eq!(AppError::field("email", "x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::RateLimited("x".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::ExternalServiceError("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn server_errors_hide_details() {
        let response =
            AppError::DatabaseError("relation \"notes\" does not exist".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], messages::SERVER_ERROR);
        assert!(json.get("field").is_none());
    }

    #[tokio::test]
    async fn field_errors_name_the_field() {
        let response = AppError::field("password", messages::PASSWORD_LENGTH).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["field"], "password");
        assert_eq!(json["error"], messages::PASSWORD_LENGTH);
    }
}
