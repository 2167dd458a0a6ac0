use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// --- Roles ---

/// Role
///
/// The only two roles the system knows about. Stored as lower-case text in the
/// `users.role` column and serialized the same way over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(value)),
        }
    }
}

// --- Core Records (Mapped to Database) ---

/// User
///
/// The canonical identity record from the `users` table. The password hash is
/// loaded for login verification but never serialized.
#[derive(Debug, Clone, Serialize, FromRow, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// UserProfile
///
/// Public projection of a `User` (everything but the password hash). Returned by
/// the auth endpoints and the admin user listing, and held by client sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_verified: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_verified: user.is_verified,
            created_at: user.created_at,
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile::from(&user)
    }
}

/// Subject
///
/// A named category of materials (`subjects` table). Names are unique.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// SubjectSummary
///
/// Listing row for `GET /api/subjects`: the subject plus its creator's name,
/// loaded via a LEFT JOIN on `users`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SubjectSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub creator_name: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Material
///
/// An uploaded file's metadata (`materials` table). The bytes themselves live in
/// the object store; `file_url` is the public retrieval URL.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Material {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub subject_id: Uuid,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
    // Incremented once per issued download link, not per byte transfer.
    pub downloads: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// MaterialSummary
///
/// Listing row for `GET /api/subjects/{id}/materials`, with the uploader's name.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MaterialSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub subject_id: Uuid,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
    pub uploader_name: Option<String>,
    pub downloads: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Repository Inputs ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
}

#[derive(Debug, Clone)]
pub struct NewSubject {
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub title: String,
    pub description: Option<String>,
    pub subject_id: Uuid,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for `POST /api/auth/register`. New accounts start unverified.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(default)]
#[ts(export)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Please include a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

impl RegisterRequest {
    /// Trims the name and normalizes the email so uniqueness is case-insensitive.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            password: self.password,
        }
    }
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(default)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(email(message = "Please include a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// CreateSubjectRequest
///
/// Input payload for `POST /api/subjects` (admin only).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(default)]
#[ts(export)]
pub struct CreateSubjectRequest {
    #[validate(length(min = 1, message = "Subject name is required"))]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CreateSubjectRequest {
    /// Trims both fields; a blank description is stored as absent.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        }
    }
}

/// UploadMaterialForm
///
/// OpenAPI description of the multipart body accepted by
/// `POST /api/subjects/{id}/materials`. Handlers read the parts directly.
#[derive(Debug, ToSchema)]
pub struct UploadMaterialForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub title: String,
    pub description: Option<String>,
}

// --- Responses (Output Schemas) ---

/// MessageResponse
///
/// Generic acknowledgement body (`{"message": "..."}`) for mutations without a
/// resource to return.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserProfile,
}

/// LoginResponse
///
/// The bearer token plus the profile a client keeps in its session.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// DownloadLink
///
/// Response of the download endpoint. The client fetches the file from the
/// object store directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DownloadLink {
    pub download_url: String,
}

/// Analytics
///
/// Aggregate counters for the admin dashboard (`GET /api/admin/analytics`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Analytics {
    pub total_users: i64,
    pub verified_users: i64,
    pub total_subjects: i64,
    pub total_materials: i64,
    pub total_downloads: i64,
}
