pub mod auth;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router with state attached.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
