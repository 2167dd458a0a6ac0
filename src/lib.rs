use axum::{
    Json, Router,
    extract::{FromRef, Request},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use std::any::Any;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any as CorsAny, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod password;
pub mod permissions;
pub mod repository;
pub mod storage;

// Typed HTTP client and navigation guard for front ends.
pub mod client;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::{AdminUser, AuthUser};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState, UnconfiguredStorage};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register, handlers::login, handlers::get_me,
        handlers::list_subjects, handlers::create_subject, handlers::list_materials,
        handlers::upload_material, handlers::download_material, handlers::list_users,
        handlers::verify_user, handlers::delete_user, handlers::get_analytics,
        handlers::delete_subject
    ),
    components(
        schemas(
            models::Role, models::UserProfile, models::Subject, models::SubjectSummary,
            models::Material, models::MaterialSummary, models::RegisterRequest,
            models::LoginRequest, models::CreateSubjectRequest, models::UploadMaterialForm,
            models::MessageResponse, models::RegisterResponse, models::LoginResponse,
            models::DownloadLink, models::Analytics, error::ErrorBody, error::FieldError,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and the current session"),
        (name = "subjects", description = "Subject catalogue"),
        (name = "materials", description = "Study material upload and download"),
        (name = "admin", description = "User moderation and analytics")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single, immutable container of shared services. Cloning it is cheap:
/// every field is an `Arc` or small owned config.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for users, subjects and materials.
    pub repo: RepositoryState,
    /// Object storage for uploaded files.
    pub storage: StorageState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Route layer for `authenticated_routes`. Extracting `AuthUser` rejects a
/// missing or invalid token with 401 before the handler runs. The resolved
/// identity is stored in the request extensions so the handler's own
/// extractor does not decode the token a second time.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// admin_middleware
///
/// Route layer for `admin_routes`: 401 without a valid token, 403 unless the
/// caller's account currently holds the admin role.
async fn admin_middleware(admin: AdminUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(admin);
    next.run(request).await
}

/// Last-resort response for a handler that panicked.
fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "message": "Something went wrong!" })),
    )
        .into_response()
}

/// Allows only the configured front-end origin, or any origin when none is set.
fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let origin = match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => AllowOrigin::exact(value),
        Some(Err(_)) => {
            tracing::warn!("FRONTEND_URL is not a valid origin; allowing any origin");
            AllowOrigin::from(CorsAny)
        }
        None => AllowOrigin::from(CorsAny),
    };

    CorsLayer::new()
        .allow_methods(CorsAny)
        .allow_headers(CorsAny)
        .allow_origin(origin)
}

/// create_router
///
/// Assembles the routing tree, applies the scoped gates and the global
/// middleware stack, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.allowed_origin.as_deref());

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no gate.
        .merge(public::public_routes())
        // Authenticated Routes: a valid token is required.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin Routes: a valid token and the admin role are required.
        .nest(
            "/api/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .fallback(handlers::not_found)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Generates a unique UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // Wraps the request/response lifecycle in a span carrying the request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Echoes x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id))
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the `TraceLayer` span so every log line of a request carries its
/// method, URI and `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
