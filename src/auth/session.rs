use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::Rng;

use crate::db::models::User;
use crate::db::{DynForumRepository, ForumRepository, RepositoryError};

/// Raw token size. Hex encoding doubles it on the wire.
const TOKEN_BYTES: usize = 32;

/// A freshly minted session the caller hands to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues, resolves and revokes opaque session tokens backed by the sessions table.
pub struct SessionManager {
    repo: DynForumRepository,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(repo: DynForumRepository, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    /// Create a new session for a user.
    pub async fn issue(&self, user_id: i64) -> Result<IssuedSession, RepositoryError> {
        let token = generate_token();
        // Storage keeps whole seconds
        let expires_at = (Utc::now() + self.ttl).trunc_subsecs(0);

        self.repo.insert_session(&token, user_id, expires_at).await?;

        Ok(IssuedSession { token, expires_at })
    }

    /// Owner of a live session, or `None` for unknown, expired and malformed tokens alike.
    pub async fn resolve(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        if !is_well_formed(token) {
            return Ok(None);
        }
        self.repo.find_session_user(token, Utc::now()).await
    }

    /// Delete a session by token. Unknown tokens are fine.
    pub async fn revoke(&self, token: &str) -> Result<(), RepositoryError> {
        if !is_well_formed(token) {
            return Ok(());
        }
        if !self.repo.delete_session(token).await? {
            tracing::debug!("Revoke of unknown session ignored");
        }
        Ok(())
    }
}

/// Generate a cryptographically random 32-byte hex token.
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
