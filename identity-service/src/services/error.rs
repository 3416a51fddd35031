use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Email error: {0}")]
    EmailError(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ServiceError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ServiceError::Forbidden(msg.into())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Configuration(e) => AppError::ConfigError(anyhow::anyhow!(e)),
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::Conflict(e) => AppError::Conflict(anyhow::anyhow!(e)),
            ServiceError::NotFound(e) => AppError::NotFound(anyhow::anyhow!(e)),
            ServiceError::Forbidden(e) => AppError::Forbidden(anyhow::anyhow!(e)),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::InvalidSession => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired session"))
            }
            ServiceError::EmailError(e) => AppError::EmailError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServiceError::validation("bad"), StatusCode::BAD_REQUEST),
            (ServiceError::conflict("dup"), StatusCode::CONFLICT),
            (ServiceError::not_found("gone"), StatusCode::NOT_FOUND),
            (ServiceError::forbidden("no"), StatusCode::FORBIDDEN),
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ServiceError::InvalidSession, StatusCode::UNAUTHORIZED),
            (
                ServiceError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::EmailError("smtp down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status_code(), expected);
        }
    }
}
