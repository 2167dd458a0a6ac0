use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    models::User,
    permissions::{DenyReason, Permission, authorize_loaded},
    repository::RepositoryState,
};

/// Claims
///
/// The payload of every bearer token. Tokens are HS256-signed with
/// `AppConfig::jwt_secret` and carry nothing but the user id and validity window;
/// role and verification state are always re-read from the store.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id.
    pub sub: Uuid,
    /// Expiration Time (exp): seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat)
    pub iat: usize,
}

/// issue_token
///
/// Signs a token for `user_id` valid for `config.jwt_ttl_hours`.
pub fn issue_token(user_id: Uuid, config: &AppConfig) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(config.jwt_ttl_hours)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))
}

/// AuthUser
///
/// The identity proven by a valid bearer token: nothing more than the user id.
/// Extracting it never touches the database.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
}

/// AuthUser Extractor Implementation
///
/// 1. Reuses an identity already attached by the route-layer middleware.
/// 2. Otherwise reads `Authorization: Bearer <token>`.
/// 3. Verifies signature and expiry against the configured secret.
///
/// Rejection: `AppError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(*user);
        }

        let config = AppConfig::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("No token, authorization denied".to_string()))?;

        let mut validation = Validation::default();
        validation.validate_exp = true;
        // Tokens are short-lived; no clock-skew allowance.
        validation.leeway = 0;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        match decode::<Claims>(token, &decoding_key, &validation) {
            Ok(data) => Ok(AuthUser {
                id: data.claims.sub,
            }),
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                    other => tracing::debug!(reason = ?other, "rejected invalid token"),
                }
                Err(AppError::Unauthorized("Token is not valid".to_string()))
            }
        }
    }
}

/// Loads the account behind `id` and checks `permission` against its current
/// role and verification flag.
async fn load_authorized<S>(state: &S, id: Uuid, permission: Permission) -> Result<User, AppError>
where
    RepositoryState: FromRef<S>,
{
    let repo = RepositoryState::from_ref(state);
    let user = repo.get_user(id).await?;

    if let Err(e) = authorize_loaded(user.as_ref(), permission).into_result() {
        tracing::info!(user_id = %id, ?permission, "access denied");
        return Err(e);
    }

    user.ok_or_else(|| DenyReason::AccountMissing.into())
}

/// VerifiedUser
///
/// A token holder whose account still exists and may read content: a verified
/// user or any admin. Rejects with 401 (bad token) or 403 (not verified / gone).
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub User);

impl<S> FromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser { id } = AuthUser::from_request_parts(parts, state).await?;
        let user = load_authorized(state, id, Permission::ReadContent).await?;
        Ok(VerifiedUser(user))
    }
}

/// AdminUser
///
/// A token holder whose account still exists and currently has the admin role.
/// Carries the freshly loaded record, so a token issued before a demotion or
/// deletion stops working immediately.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(admin) = parts.extensions.get::<AdminUser>() {
            return Ok(admin.clone());
        }

        let AuthUser { id } = AuthUser::from_request_parts(parts, state).await?;
        let user = load_authorized(state, id, Permission::Administer).await?;
        Ok(AdminUser(user))
    }
}
