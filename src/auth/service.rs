// Registration, login, logout and whoami. Transport-agnostic: tokens go in
// and come out as plain strings, cookies are the handler layer's business.

use validator::ValidateEmail;

use crate::auth::credentials::{PasswordHasher, MAX_PASSWORD_BYTES};
use crate::auth::session::{IssuedSession, SessionManager};
use crate::db::models::User;
use crate::db::{DynForumRepository, ForumRepository, RepositoryError};
use crate::error::{AppError, AppResult, ConflictField};

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session: IssuedSession,
}

pub struct AuthService {
    repo: DynForumRepository,
    hasher: PasswordHasher,
    sessions: SessionManager,
}

impl AuthService {
    pub fn new(repo: DynForumRepository, hasher: PasswordHasher, sessions: SessionManager) -> Self {
        Self {
            repo,
            hasher,
            sessions,
        }
    }

    pub async fn register(&self, email: &str, username: &str, password: &str) -> AppResult<User> {
        let email = email.trim();
        let username = username.trim();

        if email.is_empty() || username.is_empty() || password.is_empty() {
            return Err(AppError::Validation("All fields are required".into()));
        }
        if !email.validate_email() {
            return Err(AppError::Validation("Invalid email address".into()));
        }
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AppError::Validation(format!(
                "Password must be at most {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }

        if self.repo.email_exists(email).await? {
            return Err(AppError::Conflict(ConflictField::Email));
        }
        if self.repo.username_exists(username).await? {
            return Err(AppError::Conflict(ConflictField::Username));
        }

        let password_hash = self.hasher.hash(password).await?;

        // The checks above can race another registration; the UNIQUE columns settle it.
        let user = self
            .repo
            .create_user(email, username, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(detail) if detail.contains("users.email") => {
                    AppError::Conflict(ConflictField::Email)
                }
                RepositoryError::Conflict(detail) if detail.contains("users.username") => {
                    AppError::Conflict(ConflictField::Username)
                }
                other => AppError::Repository(other),
            })?;

        tracing::info!("Registered user {} ({})", user.id, user.username);
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginOutcome> {
        let record = match self.repo.find_user_by_email(email.trim()).await? {
            Some(record) => record,
            None => {
                tracing::debug!("Login rejected: unknown email");
                self.hasher.verify_dummy(password).await?;
                return Err(AppError::InvalidCredentials);
            }
        };

        if !self.hasher.verify(&record.password_hash, password).await? {
            tracing::debug!("Login rejected: bad password for user {}", record.user.id);
            return Err(AppError::InvalidCredentials);
        }

        let session = self.sessions.issue(record.user.id).await?;
        tracing::info!("User {} logged in", record.user.id);

        Ok(LoginOutcome {
            user: record.user,
            session,
        })
    }

    /// Always succeeds. Storage trouble while revoking is logged, not reported.
    pub async fn logout(&self, token: Option<&str>) {
        let Some(token) = token else {
            return;
        };
        if let Err(e) = self.sessions.revoke(token).await {
            tracing::warn!("Failed to revoke session: {}", e);
        }
    }

    pub async fn current_user(&self, token: Option<&str>) -> AppResult<User> {
        let token = token.ok_or(AppError::Unauthenticated)?;
        self.sessions
            .resolve(token)
            .await?
            .ok_or(AppError::Unauthenticated)
    }
}
