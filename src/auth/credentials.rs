//! Password hashing with bcrypt.
//!
//! bcrypt is deliberately slow, so both operations run on tokio's blocking
//! pool and share a semaphore that caps how many run at once.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{AcquireError, OnceCell, Semaphore};
use tokio::task::JoinError;

/// bcrypt only reads this many bytes of input.
pub const MAX_PASSWORD_BYTES: usize = 72;

const DUMMY_PASSWORD: &str = "dummy password for unknown accounts";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to hash password: {0}")]
    Hash(bcrypt::BcryptError),

    #[error("Password is longer than 72 bytes")]
    TooLong,

    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(bcrypt::BcryptError),

    #[error("Task join error: {0}")]
    Join(#[from] JoinError),

    #[error("Hashing limiter closed: {0}")]
    Closed(#[from] AcquireError),
}

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    permits: Arc<Semaphore>,
    dummy_hash: Arc<OnceCell<String>>,
}

impl PasswordHasher {
    pub fn new(cost: u32, max_concurrent: usize) -> Self {
        Self {
            cost,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Hash with a fresh random salt. The salt and cost are embedded in the output.
    pub async fn hash(&self, plaintext: &str) -> Result<String, CredentialError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(CredentialError::TooLong);
        }
        let _permit = self.permits.acquire().await?;
        let plaintext = plaintext.to_owned();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await?
            .map_err(CredentialError::Hash)
    }

    /// `Ok(false)` on mismatch. Errors only when `stored_hash` is not a bcrypt hash.
    ///
    /// Input past `MAX_PASSWORD_BYTES` never matches, even though bcrypt would
    /// accept it by looking at the prefix alone.
    pub async fn verify(&self, stored_hash: &str, plaintext: &str) -> Result<bool, CredentialError> {
        let too_long = plaintext.len() > MAX_PASSWORD_BYTES;
        let _permit = self.permits.acquire().await?;
        let plaintext = plaintext.to_owned();
        let stored_hash = stored_hash.to_owned();

        let matched = tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &stored_hash))
            .await?
            .map_err(CredentialError::MalformedHash)?;
        Ok(matched && !too_long)
    }

    /// Burn one verify's worth of work against a throwaway hash of the same cost.
    /// Used when there is no stored hash to check, so the miss takes as long as a hit.
    pub async fn verify_dummy(&self, plaintext: &str) -> Result<(), CredentialError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| self.hash(DUMMY_PASSWORD))
            .await?;
        self.verify(hash, plaintext).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn has_dummy_hash(&self) -> bool {
        self.dummy_hash.initialized()
    }
}
