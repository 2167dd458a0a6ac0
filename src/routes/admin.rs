use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, put},
};

/// Admin Router Module
///
/// User moderation, dashboard counters and subject removal. Nested under
/// `/api/admin` and wrapped in the `AdminUser` route layer, which re-reads the
/// caller's role on every request.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/admin/users
        .route("/users", get(handlers::list_users))
        // PUT /api/admin/users/{id}/verify
        .route("/users/{id}/verify", put(handlers::verify_user))
        // DELETE /api/admin/users/{id}
        // Admin accounts cannot be deleted.
        .route("/users/{id}", delete(handlers::delete_user))
        // GET /api/admin/analytics
        .route("/analytics", get(handlers::get_analytics))
        // DELETE /api/admin/subjects/{id}
        // Removes the subject and every material in it.
        .route("/subjects/{id}", delete(handlers::delete_subject))
}
