use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::{AuthService, PasswordHasher, SessionManager};
use crate::config::Config;
use crate::db::DynForumRepository;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wire the auth stack on top of an already-initialized repository.
    pub fn new(repo: DynForumRepository, config: Config) -> Self {
        let hasher = PasswordHasher::new(
            config.auth.bcrypt_cost,
            config.auth.max_concurrent_hashes,
        );
        let sessions = SessionManager::new(repo.clone(), config.session_ttl());
        let auth = AuthService::new(repo, hasher, sessions);

        Self {
            config,
            auth: Arc::new(auth),
        }
    }
}
