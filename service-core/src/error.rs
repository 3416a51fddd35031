use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error type returned by every HTTP-facing operation.
///
/// Variants map one-to-one onto a status code. Only `ValidationError` and
/// `TooManyRequests` attach details to the response body; store, email and
/// internal failures are logged and collapsed to a generic message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_, _) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::EmailError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (error_message, details, retry_after) = match self {
            AppError::ValidationError(err) => {
                ("Validation error".to_string(), Some(err.to_string()), None)
            }
            AppError::BadRequest(err)
            | AppError::NotFound(err)
            | AppError::Unauthorized(err)
            | AppError::Forbidden(err)
            | AppError::Conflict(err) => (err.to_string(), None, None),
            AppError::TooManyRequests(msg, retry) => (msg, None, retry),
            AppError::ServiceUnavailable => ("Service unavailable".to_string(), None, None),
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal error");
                ("Internal server error".to_string(), None, None)
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                ("Internal server error".to_string(), None, None)
            }
            AppError::EmailError(msg) => {
                tracing::error!(error = %msg, "Email error");
                ("Internal server error".to_string(), None, None)
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                ("Internal server error".to_string(), None, None)
            }
        };

        let mut res = (
            status,
            Json(ErrorBody {
                error: error_message,
                details,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Conflict(anyhow::anyhow!("taken")).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::NotFound(anyhow::anyhow!("gone")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::DatabaseError(anyhow::anyhow!("down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_not_exposed() {
        let res = AppError::DatabaseError(anyhow::anyhow!("relation users does not exist"))
            .into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("relation users"));
        assert!(text.contains("Internal server error"));
    }

    #[tokio::test]
    async fn test_retry_after_header() {
        let res = AppError::TooManyRequests("slow down".to_string(), Some(12)).into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            res.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "12"
        );
    }
}
