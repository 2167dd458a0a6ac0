use crate::{
    AppState,
    auth::{AdminUser, AuthUser, VerifiedUser, issue_token},
    error::{AppError, AppResult, ErrorBody, FieldError},
    extract::{AppJson, AppPath},
    models::{
        Analytics, CreateSubjectRequest, DownloadLink, LoginRequest, LoginResponse, Material,
        MaterialSummary, MessageResponse, NewMaterial, NewSubject, NewUser, RegisterRequest,
        RegisterResponse, Role, Subject, SubjectSummary, UploadMaterialForm, UserProfile,
    },
    password::{hash_password, verify_password},
    permissions::authorize_user_deletion,
    repository::RepositoryError,
    storage::object_key,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

/// Upload ceiling for a single material file.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// MIME types accepted by the upload endpoint: PDF, DOC, DOCX, JPEG, PNG, plain text.
pub const ALLOWED_MIME_TYPES: [&str; 6] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "image/jpeg",
    "image/png",
    "text/plain",
];

// --- Public ---

/// welcome
pub async fn welcome() -> &'static str {
    "Welcome to the StudyBuddy API"
}

/// not_found
///
/// Router fallback: unknown paths get the same JSON error shape as everything else.
pub async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

/// register
///
/// [Public Route] Creates an unverified `user` account. The account can log in
/// right away but cannot read content until an admin verifies it.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = RegisterResponse),
        (status = 400, description = "Validation failed or email taken", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let payload = payload.normalized();
    payload.validate()?;

    let password_hash = hash_password(&payload.password)?;

    let user = state
        .repo
        .create_user(NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
            role: Role::User,
            is_verified: false,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Duplicate(_) => AppError::Conflict("User already exists".to_string()),
            other => other.into(),
        })?;

    tracing::info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please wait for admin verification.".to_string(),
            user: user.into(),
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges email and password for a bearer token and the
/// caller's profile. Unknown email and wrong password are indistinguishable.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let payload = LoginRequest {
        email: payload.email.trim().to_lowercase(),
        password: payload.password,
    };
    payload.validate()?;

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = state
        .repo
        .get_user_by_email(&payload.email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "login rejected: wrong password");
        return Err(invalid());
    }

    let token = issue_token(user.id, &state.config)?;

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

// --- Authenticated ---

/// get_me
///
/// [Authenticated Route] The caller's current profile. Clients call this to
/// refresh their session after role or verification changes.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    )
)]
pub async fn get_me(
    AuthUser { id }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserProfile>> {
    match state.repo.get_user(id).await? {
        Some(user) => Ok(Json(user.into())),
        // The token outlived its account.
        None => Err(AppError::Unauthorized("Account no longer exists".to_string())),
    }
}

/// list_subjects
///
/// [Verified Route] All subjects, each with its creator's name.
#[utoipa::path(
    get,
    path = "/api/subjects",
    tag = "subjects",
    responses(
        (status = 200, description = "Subjects", body = [SubjectSummary]),
        (status = 403, description = "Account not verified", body = ErrorBody)
    )
)]
pub async fn list_subjects(
    VerifiedUser(_user): VerifiedUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<SubjectSummary>>> {
    Ok(Json(state.repo.list_subjects().await?))
}

/// create_subject
///
/// [Admin Route] Creates a subject owned by the calling admin.
#[utoipa::path(
    post,
    path = "/api/subjects",
    tag = "subjects",
    request_body = CreateSubjectRequest,
    responses(
        (status = 201, description = "Created", body = Subject),
        (status = 400, description = "Missing name or subject already exists", body = ErrorBody),
        (status = 403, description = "Admin access required", body = ErrorBody)
    )
)]
pub async fn create_subject(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateSubjectRequest>,
) -> AppResult<(StatusCode, Json<Subject>)> {
    let payload = payload.normalized();
    payload.validate()?;

    let subject = state
        .repo
        .create_subject(NewSubject {
            name: payload.name,
            description: payload.description,
            created_by: admin.id,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Duplicate(_) => AppError::Conflict("Subject already exists".to_string()),
            other => other.into(),
        })?;

    tracing::info!(subject_id = %subject.id, admin_id = %admin.id, "subject created");

    Ok((StatusCode::CREATED, Json(subject)))
}

/// list_materials
///
/// [Verified Route] Materials of one subject, newest first, with uploader names.
/// An unknown subject simply has no materials.
#[utoipa::path(
    get,
    path = "/api/subjects/{id}/materials",
    tag = "materials",
    params(("id" = Uuid, Path, description = "Subject ID")),
    responses(
        (status = 200, description = "Materials", body = [MaterialSummary]),
        (status = 403, description = "Account not verified", body = ErrorBody)
    )
)]
pub async fn list_materials(
    VerifiedUser(_user): VerifiedUser,
    State(state): State<AppState>,
    AppPath(subject_id): AppPath<Uuid>,
) -> AppResult<Json<Vec<MaterialSummary>>> {
    Ok(Json(state.repo.list_materials(subject_id).await?))
}

/// The parts of an upload form this API understands.
#[derive(Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    title: String,
    description: Option<String>,
}

struct UploadedFile {
    file_name: String,
    content_type: String,
    bytes: Bytes,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("File exceeds the 50 MB limit".to_string())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Reads every part of the multipart body; unknown parts are skipped.
async fn read_upload_form(multipart: &mut Multipart) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some("title") => form.title = field.text().await.map_err(multipart_error)?,
            Some("description") => {
                let text = field.text().await.map_err(multipart_error)?;
                form.description = Some(text.trim().to_string()).filter(|d| !d.is_empty());
            }
            _ => {}
        }
    }

    Ok(form)
}

/// upload_material
///
/// [Admin Route] Stores one file in the object store and records its metadata.
///
/// Checks run in a fixed order and all of them finish before anything is
/// written: subject exists, storage configured, file present, MIME type
/// allowed, size within the ceiling, title present. A store failure after that
/// point is reported as a generic 500; no cleanup is attempted.
#[utoipa::path(
    post,
    path = "/api/subjects/{id}/materials",
    tag = "materials",
    params(("id" = Uuid, Path, description = "Subject ID")),
    request_body(content = UploadMaterialForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Uploaded", body = Material),
        (status = 400, description = "Missing file, bad type or missing title", body = ErrorBody),
        (status = 404, description = "Subject not found", body = ErrorBody),
        (status = 413, description = "File too large", body = ErrorBody),
        (status = 500, description = "Storage unavailable or failed", body = ErrorBody)
    )
)]
pub async fn upload_material(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    AppPath(subject_id): AppPath<Uuid>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Material>)> {
    if state.repo.get_subject(subject_id).await?.is_none() {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    if !state.storage.is_configured() {
        return Err(AppError::NotConfigured("File storage not configured".to_string()));
    }

    let form = read_upload_form(&mut multipart).await?;

    let file = form
        .file
        .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

    if !ALLOWED_MIME_TYPES.contains(&file.content_type.as_str()) {
        tracing::info!(content_type = %file.content_type, "upload rejected: file type");
        return Err(AppError::BadRequest(
            "Invalid file type. Only PDF, DOC, DOCX, JPG, PNG, and TXT files are allowed."
                .to_string(),
        ));
    }

    if file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::PayloadTooLarge("File exceeds the 50 MB limit".to_string()));
    }

    let title = form.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::Validation(vec![FieldError {
            field: "title".to_string(),
            message: "Title is required".to_string(),
        }]));
    }

    let key = object_key(&file.file_name);
    let file_size = file.bytes.len() as i64;

    tracing::info!(key = %key, size = file_size, content_type = %file.content_type, "uploading material");

    let file_url = state
        .storage
        .upload(&key, file.bytes, &file.content_type)
        .await?;

    let material = state
        .repo
        .create_material(NewMaterial {
            title,
            description: form.description,
            subject_id,
            file_url,
            file_name: file.file_name,
            file_size,
            uploaded_by: admin.id,
        })
        .await
        .map_err(|e| match e {
            // The subject was deleted while the file was uploading.
            RepositoryError::MissingReference(_) => AppError::NotFound("Subject not found".to_string()),
            other => other.into(),
        })?;

    tracing::info!(material_id = %material.id, subject_id = %subject_id, "material uploaded");

    Ok((StatusCode::CREATED, Json(material)))
}

/// download_material
///
/// [Verified Route] Issues the material's public URL and counts the issuance.
/// The counter goes up once per call whether or not the client fetches the file.
#[utoipa::path(
    get,
    path = "/api/subjects/materials/{id}/download",
    tag = "materials",
    params(("id" = Uuid, Path, description = "Material ID")),
    responses(
        (status = 200, description = "Download link", body = DownloadLink),
        (status = 404, description = "Material not found", body = ErrorBody),
        (status = 500, description = "Storage not configured", body = ErrorBody)
    )
)]
pub async fn download_material(
    VerifiedUser(_user): VerifiedUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<DownloadLink>> {
    if !state.storage.is_configured() {
        return Err(AppError::NotConfigured("File storage not configured".to_string()));
    }

    let material = state
        .repo
        .record_download(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Material not found".to_string()))?;

    Ok(Json(DownloadLink {
        download_url: material.file_url,
    }))
}

// --- Admin ---

/// list_users
///
/// [Admin Route] Every account, newest first, without password hashes.
#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "admin",
    responses((status = 200, description = "Users", body = [UserProfile]))
)]
pub async fn list_users(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<UserProfile>>> {
    let users = state.repo.list_users().await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// verify_user
///
/// [Admin Route] Sets the verification flag. Verifying twice is harmless.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/verify",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Verified", body = MessageResponse),
        (status = 404, description = "User not found", body = ErrorBody)
    )
)]
pub async fn verify_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    if !state.repo.verify_user(id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %id, admin_id = %admin.id, "user verified");
    Ok(Json(MessageResponse::new("User verified successfully")))
}

/// delete_user
///
/// [Admin Route] Deletes a non-admin account. Admin targets are refused with
/// 400 and nothing changes.
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    tag = "admin",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 400, description = "Target is an admin", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    )
)]
pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let target = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    authorize_user_deletion(&target).into_result()?;

    if !state.repo.delete_user(id).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %id, admin_id = %admin.id, "user deleted");
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

/// get_analytics
///
/// [Admin Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/api/admin/analytics",
    tag = "admin",
    responses((status = 200, description = "Counters", body = Analytics))
)]
pub async fn get_analytics(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> AppResult<Json<Analytics>> {
    Ok(Json(state.repo.get_analytics().await?))
}

/// delete_subject
///
/// [Admin Route] Deletes a subject together with all of its materials. The
/// stored files are left in the object store.
#[utoipa::path(
    delete,
    path = "/api/admin/subjects/{id}",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Subject ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Subject not found", body = ErrorBody)
    )
)]
pub async fn delete_subject(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let removed = state
        .repo
        .delete_subject(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subject not found".to_string()))?;

    tracing::info!(subject_id = %id, materials_removed = removed, admin_id = %admin.id, "subject deleted");
    Ok(Json(MessageResponse::new(
        "Subject and its materials deleted successfully",
    )))
}
