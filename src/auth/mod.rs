pub mod credentials;
pub mod handlers;
pub mod service;
pub mod session;

pub use credentials::{CredentialError, PasswordHasher};
pub use service::{AuthService, LoginOutcome};
pub use session::{IssuedSession, SessionManager};
