use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

use crate::state::AppState;

pub mod users;

/// Largest accepted request body; registration carries image uploads
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Build the application router with all routes
pub fn routes(app_state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/healthz", get(health_check))
        // Account routes
        .route("/api/v1/users/register", post(users::register))
        .route("/api/v1/users/login", post(users::login))
        .route("/api/v1/users/logout", post(users::logout))
        .route("/api/v1/users/refresh-token", post(users::refresh_access_token))
        .route("/api/v1/users/me", get(users::current_user))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        // Add trace layer for debugging
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Liveness probe
async fn health_check() -> &'static str {
    "OK"
}
