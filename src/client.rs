//! Typed client for the StudyBuddy API.
//!
//! [`ApiClient`] owns the caller's [`Session`] and keeps it honest: a 401
//! from the server drops the session, a 403 re-reads the profile so role and
//! verification changes made by an admin show up without logging in again.
//! [`guard`] is the front end's navigation rule, decided by the same
//! [`authorize`] the server gates use.

use reqwest::{Method, RequestBuilder, StatusCode, multipart};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    error::ErrorBody,
    models::{
        Analytics, CreateSubjectRequest, DownloadLink, LoginRequest, LoginResponse, Material,
        MaterialSummary, MessageResponse, RegisterRequest, RegisterResponse, Subject,
        SubjectSummary, UserProfile,
    },
    permissions::{Decision, DenyReason, Permission, Principal, authorize},
};

/// ClientError
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure or an undecodable response body.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{status}: {message}")]
    Api { status: u16, message: String },

    /// The call needs a logged-in session and there is none.
    #[error("not logged in")]
    NoSession,
}

/// Session
///
/// The bearer token and the profile it was issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

/// Area
///
/// The two protected sections of the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// Subject browsing and downloads.
    Member,
    /// The admin dashboard.
    Admin,
}

/// Navigation
///
/// Where the front end should go when the user opens an area. Redirects carry
/// the notice to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    ToLogin(&'static str),
    ToDashboard(&'static str),
}

pub const LOGIN_REQUIRED: &str = "Please login to access this page";

/// guard
///
/// Without a session every area redirects to the login page. An unverified
/// member is sent back to login; a non-admin opening the admin area is sent to
/// the member dashboard.
pub fn guard(session: Option<&Session>, area: Area) -> Navigation {
    let Some(session) = session else {
        return Navigation::ToLogin(LOGIN_REQUIRED);
    };

    let permission = match area {
        Area::Member => Permission::ReadContent,
        Area::Admin => Permission::Administer,
    };

    match authorize(Principal::from(&session.user), permission) {
        Decision::Allow => Navigation::Proceed,
        Decision::Deny(DenyReason::NotAdmin) => {
            Navigation::ToDashboard(DenyReason::NotAdmin.message())
        }
        Decision::Deny(reason) => Navigation::ToLogin(reason.message()),
    }
}

/// MaterialUpload
///
/// One file plus its metadata, as sent to the upload endpoint.
#[derive(Debug, Clone)]
pub struct MaterialUpload {
    pub title: String,
    pub description: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// ApiClient
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Option<Session>,
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://localhost:5000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Navigation decision for the current session.
    pub fn guard(&self, area: Area) -> Navigation {
        guard(self.session.as_ref(), area)
    }

    pub fn logout(&mut self) {
        self.session = None;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NoSession)?;
        Ok(self
            .http
            .request(method, self.url(path))
            .bearer_auth(&session.token))
    }

    /// Sends `request` and decodes a success body as `T`. Error statuses update
    /// the session before being returned as `ClientError::Api`.
    async fn send<T: DeserializeOwned>(&mut self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("Request failed").to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => {
                tracing::debug!("session rejected by server; logging out");
                self.session = None;
            }
            StatusCode::FORBIDDEN => self.reload_profile().await,
            _ => {}
        }

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Best-effort refresh after a 403: the stored profile may be stale.
    async fn reload_profile(&mut self) {
        let Ok(request) = self.authed(Method::GET, "/api/auth/me") else {
            return;
        };

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                if let (Ok(user), Some(session)) =
                    (response.json::<UserProfile>().await, self.session.as_mut())
                {
                    session.user = user;
                }
            }
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => self.session = None,
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "profile refresh failed"),
        }
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &mut self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let request = self.authed(method, path)?.json(body);
        self.send(request).await
    }

    async fn get<T: DeserializeOwned>(&mut self, path: &str) -> Result<T, ClientError> {
        let request = self.authed(Method::GET, path)?;
        self.send(request).await
    }

    // --- Identity ---

    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterResponse, ClientError> {
        let request = self
            .http
            .post(self.url("/api/auth/register"))
            .json(&RegisterRequest {
                name: name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            });
        self.send(request).await
    }

    /// Logs in and replaces the current session.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<&Session, ClientError> {
        let request = self.http.post(self.url("/api/auth/login")).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });

        let LoginResponse { token, user } = self.send(request).await?;
        Ok(&*self.session.insert(Session { token, user }))
    }

    /// Re-reads the caller's profile into the session.
    pub async fn refresh_profile(&mut self) -> Result<UserProfile, ClientError> {
        let user: UserProfile = self.get("/api/auth/me").await?;
        if let Some(session) = self.session.as_mut() {
            session.user = user.clone();
        }
        Ok(user)
    }

    // --- Content ---

    pub async fn subjects(&mut self) -> Result<Vec<SubjectSummary>, ClientError> {
        self.get("/api/subjects").await
    }

    pub async fn create_subject(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Subject, ClientError> {
        let body = CreateSubjectRequest {
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        self.send_json(Method::POST, "/api/subjects", &body).await
    }

    pub async fn materials(&mut self, subject_id: Uuid) -> Result<Vec<MaterialSummary>, ClientError> {
        self.get(&format!("/api/subjects/{}/materials", subject_id))
            .await
    }

    pub async fn upload_material(
        &mut self,
        subject_id: Uuid,
        upload: MaterialUpload,
    ) -> Result<Material, ClientError> {
        let file = multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)?;

        let mut form = multipart::Form::new()
            .text("title", upload.title)
            .part("file", file);
        if let Some(description) = upload.description {
            form = form.text("description", description);
        }

        let request = self
            .authed(Method::POST, &format!("/api/subjects/{}/materials", subject_id))?
            .multipart(form);
        self.send(request).await
    }

    /// Asks the server for the material's public URL. Each call counts as a download.
    pub async fn download_url(&mut self, material_id: Uuid) -> Result<String, ClientError> {
        let link: DownloadLink = self
            .get(&format!("/api/subjects/materials/{}/download", material_id))
            .await?;
        Ok(link.download_url)
    }

    // --- Admin ---

    pub async fn users(&mut self) -> Result<Vec<UserProfile>, ClientError> {
        self.get("/api/admin/users").await
    }

    pub async fn verify_user(&mut self, id: Uuid) -> Result<MessageResponse, ClientError> {
        let request = self.authed(Method::PUT, &format!("/api/admin/users/{}/verify", id))?;
        self.send(request).await
    }

    pub async fn delete_user(&mut self, id: Uuid) -> Result<MessageResponse, ClientError> {
        let request = self.authed(Method::DELETE, &format!("/api/admin/users/{}", id))?;
        self.send(request).await
    }

    pub async fn analytics(&mut self) -> Result<Analytics, ClientError> {
        self.get("/api/admin/analytics").await
    }

    pub async fn delete_subject(&mut self, id: Uuid) -> Result<MessageResponse, ClientError> {
        let request = self.authed(Method::DELETE, &format!("/api/admin/subjects/{}", id))?;
        self.send(request).await
    }
}
