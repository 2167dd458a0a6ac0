use std::sync::Arc;
use study_buddy::{
    AppState,
    bootstrap::ensure_admin,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, Repository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState, UnconfiguredStorage},
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the database, object storage and the
/// bootstrap admin, then serves the HTTP API.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "study_buddy=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let postgres = PostgresRepository::new(pool);
    postgres
        .migrate()
        .await
        .expect("FATAL: Failed to run database migrations.");
    let repo = Arc::new(postgres) as RepositoryState;

    // 4. Storage: missing credentials degrade the upload/download endpoints
    // instead of stopping the server.
    let storage: StorageState = match &config.storage {
        Some(storage_config) => {
            let s3_client = S3StorageClient::new(storage_config);
            if config.env == Env::Local {
                s3_client.ensure_bucket_exists().await;
            }
            Arc::new(s3_client)
        }
        None => {
            tracing::warn!("Storage credentials missing; uploads and downloads are disabled.");
            Arc::new(UnconfiguredStorage)
        }
    };

    // 5. Bootstrap admin
    if let Some(seed) = &config.admin_seed {
        ensure_admin(repo.as_ref(), seed)
            .await
            .expect("FATAL: Failed to create the bootstrap admin.");
    }
    match repo.admin_exists().await {
        Ok(false) => tracing::warn!("No admin account exists; set ADMIN_EMAIL and ADMIN_PASSWORD."),
        Ok(true) => {}
        Err(e) => tracing::warn!(error = %e, "Could not check for an admin account"),
    }

    let port = config.port;
    let app = create_router(AppState {
        repo,
        storage,
        config,
    });

    // 6. Server
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("FATAL: Failed to bind the HTTP port.");

    tracing::info!("Listening on 0.0.0.0:{}", port);
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{}/swagger-ui", port);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server error.");
}
