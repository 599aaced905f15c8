use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// -- Response envelope --

/// Shared by every auth endpoint, success or failure.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl AuthResponse {
    pub fn ok(message: impl Into<String>, user: Option<User>) -> Self {
        Self {
            success: true,
            message: message.into(),
            user,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            user: None,
        }
    }
}

// -- Cookie helpers --

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn session_cookie(name: &str, token: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Expires={}",
        name,
        token,
        http_date(expires_at)
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0",
        name
    )
}

pub(crate) fn get_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

fn bad_payload(rejection: JsonRejection) -> AppError {
    tracing::debug!("Rejected request body: {}", rejection);
    AppError::Validation("Invalid request format".into())
}

// -- Handlers --

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = payload.map_err(bad_payload)?;

    let user = state
        .auth
        .register(&req.email, &req.username, &req.password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(AuthResponse::ok("User registered successfully", Some(user))),
    )
        .into_response())
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = payload.map_err(bad_payload)?;

    let outcome = state.auth.login(&req.email, &req.password).await?;
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &outcome.session.token,
        outcome.session.expires_at,
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::ok("Login successful", Some(outcome.user))),
    )
        .into_response())
}

/// POST /api/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie_name = &state.config.auth.cookie_name;
    state
        .auth
        .logout(get_cookie_value(&headers, cookie_name))
        .await;

    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(cookie_name))],
        Json(AuthResponse::ok("Logged out successfully", None)),
    )
        .into_response()
}

/// GET /api/me
pub async fn me(CurrentUser(user): CurrentUser) -> Json<AuthResponse> {
    Json(AuthResponse::ok("User found", Some(user)))
}
