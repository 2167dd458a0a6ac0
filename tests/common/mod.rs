#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use std::sync::{Arc, OnceLock};
use study_buddy::{
    AppConfig, AppState, InMemoryRepository, MockStorageService, create_router,
    auth::issue_token,
    models::{NewSubject, NewUser, Role, Subject, User},
    password::hash_password,
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use tokio::net::TcpListener;

pub const PASSWORD: &str = "secret123";

/// Hashing is slow in debug builds; every seeded user shares one hash of `PASSWORD`.
fn password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).unwrap()).clone()
}

/// State backed by the in-memory store and the given storage.
pub fn create_test_state(storage: StorageState) -> AppState {
    AppState {
        repo: Arc::new(InMemoryRepository::new()) as RepositoryState,
        storage,
        config: AppConfig::default(),
    }
}

pub fn mock_state() -> (AppState, MockStorageService) {
    let storage = MockStorageService::new();
    (create_test_state(Arc::new(storage.clone())), storage)
}

pub async fn seed_user(state: &AppState, email: &str, role: Role, is_verified: bool) -> User {
    state
        .repo
        .create_user(NewUser {
            name: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            password_hash: password_hash(),
            role,
            is_verified,
        })
        .await
        .unwrap()
}

pub async fn seed_subject(state: &AppState, name: &str, created_by: &User) -> Subject {
    state
        .repo
        .create_subject(NewSubject {
            name: name.to_string(),
            description: None,
            created_by: created_by.id,
        })
        .await
        .unwrap()
}

pub fn token_for(state: &AppState, user: &User) -> String {
    issue_token(user.id, &state.config).unwrap()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub fn router(state: &AppState) -> Router {
    create_router(state.clone())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn send_json(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// A request whose body is sent as-is, with an optional Content-Type.
pub fn send_raw(
    method: &str,
    uri: &str,
    token: Option<&str>,
    content_type: Option<&str>,
    body: &str,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn send_empty(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::empty()).unwrap()
}

pub const BOUNDARY: &str = "study-buddy-test-boundary";

/// One part of a hand-built multipart body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(subject_id: uuid::Uuid, token: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/subjects/{}/materials", subject_id))
        .header(header::AUTHORIZATION, bearer(token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// Serves the router on an ephemeral port and returns its base URL.
pub async fn spawn_app(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    let router = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://127.0.0.1:{}", port)
}
