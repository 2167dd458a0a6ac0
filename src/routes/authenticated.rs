use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};

/// Request body ceiling for the upload route: the file limit plus room for the
/// other form fields and multipart framing. The handler enforces the exact
/// file limit itself.
const UPLOAD_BODY_LIMIT: usize = handlers::MAX_UPLOAD_BYTES + 1024 * 1024;

/// Authenticated Router Module
///
/// Every route here sits behind the `AuthUser` route layer (a valid token is
/// required). Reading content additionally needs a verified account
/// (`VerifiedUser`); writing content needs an admin (`AdminUser`).
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/auth/me
        .route("/api/auth/me", get(handlers::get_me))
        // GET  /api/subjects  (verified)
        // POST /api/subjects  (admin)
        .route(
            "/api/subjects",
            get(handlers::list_subjects).post(handlers::create_subject),
        )
        // GET  /api/subjects/{id}/materials  (verified)
        // POST /api/subjects/{id}/materials  (admin, multipart)
        .route(
            "/api/subjects/{id}/materials",
            get(handlers::list_materials)
                .post(handlers::upload_material)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        // GET /api/subjects/materials/{id}/download  (verified)
        // Issues the public URL and increments the download counter.
        .route(
            "/api/subjects/materials/{id}/download",
            get(handlers::download_material),
        )
}
