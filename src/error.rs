use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::credentials::CredentialError;
use crate::auth::handlers::AuthResponse;
use crate::db::RepositoryError;

/// Which unique user column a registration collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Email,
    Username,
}

impl ConflictField {
    pub fn message(self) -> &'static str {
        match self {
            ConflictField::Email => "Email already registered",
            ConflictField::Username => "Username already taken",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{}", .0.message())]
    Conflict(ConflictField),

    /// Same error for unknown email and wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) | AppError::InvalidCredentials => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Repository(_) | AppError::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Conflict(field) => field.message().to_string(),
            AppError::InvalidCredentials => "Invalid credentials".to_string(),
            AppError::Unauthenticated => "Not authenticated".to_string(),
            AppError::Repository(e) => {
                tracing::error!("Repository error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Credential(e) => {
                tracing::error!("Credential error: {}", e);
                "Internal server error".to_string()
            }
        };

        (self.status(), Json(AuthResponse::failure(message))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    async fn response_json(err: AppError) -> serde_json::Value {
        let body = axum::body::to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn client_errors_return_400() {
        assert_eq!(
            response_status(AppError::Validation("oops".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            response_status(AppError::Conflict(ConflictField::Email)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            response_status(AppError::InvalidCredentials),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unauthenticated_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthenticated),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn storage_and_credential_failures_return_500() {
        assert_eq!(
            response_status(AppError::Repository(RepositoryError::Corrupt("boom".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let bad_hash = bcrypt::verify("pw", "not-a-hash").unwrap_err();
        assert_eq!(
            response_status(AppError::Credential(CredentialError::MalformedHash(bad_hash))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn failure_body_uses_envelope() {
        let body = response_json(AppError::Conflict(ConflictField::Username)).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Username already taken");
        assert!(body.get("user").is_none());
    }

    #[tokio::test]
    async fn internal_error_text_is_not_leaked() {
        let err = AppError::Repository(RepositoryError::Corrupt(
            "SELECT secret FROM users".into(),
        ));
        let body = response_json(err).await;
        assert_eq!(body["message"], "Internal server error");
    }
}
