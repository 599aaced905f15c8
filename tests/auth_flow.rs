//! HTTP-level tests for the auth endpoints
//!
//! Drives the real router in-process against an on-disk SQLite database.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use forum::config::Config;
use forum::db::{self, DynForumRepository, ForumRepository, SqliteForumRepository};
use forum::routes;
use forum::state::AppState;

struct TestApp {
    router: Router,
    repo: DynForumRepository,
    _dir: TempDir,
}

fn test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db"), 4).unwrap();
    db::run_migrations(&pool).unwrap();

    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;

    let repo: DynForumRepository = Arc::new(SqliteForumRepository::new(pool));
    let router = routes::app(AppState::new(repo.clone(), config));

    TestApp {
        router,
        repo,
        _dir: dir,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, headers, json)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_cookie(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn register(app: &TestApp, email: &str, username: &str, password: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(
        app,
        post_json(
            "/api/register",
            json!({ "email": email, "username": username, "password": password }),
        ),
    )
    .await;
    (status, body)
}

async fn login(app: &TestApp, email: &str, password: &str) -> (StatusCode, HeaderMap, Value) {
    send(
        app,
        post_json("/api/login", json!({ "email": email, "password": password })),
    )
    .await
}

fn set_cookie(headers: &HeaderMap) -> &str {
    headers
        .get(header::SET_COOKIE)
        .expect("response should set a cookie")
        .to_str()
        .unwrap()
}

/// `name=value` part of a Set-Cookie header, ready to send back.
fn cookie_pair(headers: &HeaderMap) -> String {
    set_cookie(headers).split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_register_login_me_logout_scenario() {
    let app = test_app();

    let (status, body) = register(&app, "a@x.com", "alice", "pw123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "User registered successfully");
    assert_eq!(body["user"]["id"], 1);
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["user"].get("password").is_none());

    let (status, body) = register(&app, "a@x.com", "bob", "pw456").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Email already registered");

    let (status, headers, body) = login(&app, "a@x.com", "wrong").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid credentials");
    assert!(headers.get(header::SET_COOKIE).is_none());

    let (status, headers, body) = login(&app, "a@x.com", "pw123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["user"]["email"], "a@x.com");
    let cookie = cookie_pair(&headers);
    assert!(cookie.starts_with("session_id="));

    let (status, _, body) = send(&app, with_cookie("GET", "/api/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User found");
    assert_eq!(body["user"]["username"], "alice");

    let (status, headers, body) =
        send(&app, with_cookie("POST", "/api/logout", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");
    assert!(set_cookie(&headers).contains("Max-Age=0"));

    let (status, _, body) = send(&app, with_cookie("GET", "/api/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Not authenticated");
}

#[tokio::test]
async fn test_login_cookie_attributes() {
    let app = test_app();
    register(&app, "a@x.com", "alice", "pw123").await;

    let before = Utc::now();
    let (_, headers, _) = login(&app, "a@x.com", "pw123").await;
    let raw = set_cookie(&headers);

    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("Path=/"));

    let token = cookie_pair(&headers)["session_id=".len()..].to_string();
    assert_eq!(token.len(), 64);

    let expires = raw
        .split(';')
        .map(|part| part.trim())
        .find_map(|part| part.strip_prefix("Expires="))
        .expect("cookie should carry Expires");
    let expires = DateTime::parse_from_rfc2822(expires).unwrap().with_timezone(&Utc);
    let ttl = expires - before;
    assert!(ttl > Duration::hours(23) && ttl <= Duration::hours(24) + Duration::seconds(1));
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_are_indistinguishable() {
    let app = test_app();
    register(&app, "a@x.com", "alice", "pw123").await;

    let (status_unknown, _, body_unknown) = login(&app, "ghost@x.com", "pw123").await;
    let (status_wrong, _, body_wrong) = login(&app, "a@x.com", "pw999").await;

    assert_eq!(status_unknown, status_wrong);
    assert_eq!(body_unknown, body_wrong);
}

#[tokio::test]
async fn test_duplicate_username_rejected() {
    let app = test_app();
    register(&app, "a@x.com", "alice", "pw").await;

    let (status, body) = register(&app, "b@x.com", "alice", "pw").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username already taken");
}

#[tokio::test]
async fn test_missing_fields_rejected() {
    let app = test_app();

    let (status, body) = register(&app, "a@x.com", "", "pw").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "All fields are required");

    let (status, _, body) = send(
        &app,
        post_json("/api/register", json!({ "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request format");
}

#[tokio::test]
async fn test_password_longer_than_72_bytes_rejected() {
    let app = test_app();
    let prefix = "a".repeat(72);

    let (status, body) = register(&app, "a@x.com", "alice", &format!("{}SECRET", prefix)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Password must be at most 72 bytes");

    let (status, _) = register(&app, "a@x.com", "alice", &prefix).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, body) = login(&app, "a@x.com", &format!("{}WRONG", prefix)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid credentials");
    assert!(headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_malformed_body_uses_envelope() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid request format");
}

#[tokio::test]
async fn test_me_without_or_with_bogus_cookie() {
    let app = test_app();

    let (status, _, _) = send(&app, with_cookie("GET", "/api/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bogus = format!("session_id={}", "ab".repeat(32));
    let (status, _, body) = send(&app, with_cookie("GET", "/api/me", Some(&bogus))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authenticated");
}

#[tokio::test]
async fn test_expired_session_cookie_is_unauthenticated() {
    let app = test_app();
    let (_, body) = register(&app, "a@x.com", "alice", "pw").await;
    let user_id = body["user"]["id"].as_i64().unwrap();

    let token = "cd".repeat(32);
    app.repo
        .insert_session(&token, user_id, Utc::now() - Duration::hours(1))
        .await
        .unwrap();

    let cookie = format!("session_id={}", token);
    let (status, _, _) = send(&app, with_cookie("GET", "/api/me", Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_cookie_still_succeeds() {
    let app = test_app();
    let (status, headers, body) = send(&app, with_cookie("POST", "/api/logout", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(set_cookie(&headers).starts_with("session_id=;"));
}

#[tokio::test]
async fn test_concurrent_registrations_yield_one_user() {
    let app = Arc::new(test_app());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                register(&app, "race@x.com", &format!("racer{}", i), "pw").await.0
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        let status = handle.await.unwrap();
        if status == StatusCode::OK {
            successes += 1;
        } else {
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }
    assert_eq!(successes, 1);
}
