use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::handlers::get_cookie_value;
use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;

/// The user behind the request's session cookie.
/// Rejects with 401 when the cookie is missing, unknown or expired.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie_value(&parts.headers, &state.config.auth.cookie_name);
        let user = state.auth.current_user(token).await?;
        Ok(CurrentUser(user))
    }
}
