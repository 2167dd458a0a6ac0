use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Liveness checks and the two identity endpoints. Nothing here reads or
/// writes study content.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        .route("/", get(handlers::welcome))
        // GET /health
        // Used by load balancers; answers "ok" without touching the database.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/register
        // Creates an unverified account.
        .route("/api/auth/register", post(handlers::register))
        // POST /api/auth/login
        .route("/api/auth/login", post(handlers::login))
}
