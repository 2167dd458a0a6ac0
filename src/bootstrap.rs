use crate::{
    config::AdminSeed,
    error::AppError,
    models::{NewUser, Role},
    password::hash_password,
    repository::{Repository, RepositoryError},
};

/// ensure_admin
///
/// Creates the bootstrap admin described by `seed` unless an account with that
/// email already exists. The created account is verified from the start.
///
/// Returns `true` when an account was created. Running it at every startup is
/// safe; an existing account (admin or not) is left untouched.
pub async fn ensure_admin(repo: &dyn Repository, seed: &AdminSeed) -> Result<bool, AppError> {
    let email = seed.email.trim().to_lowercase();

    if repo.get_user_by_email(&email).await?.is_some() {
        tracing::debug!(email = %email, "bootstrap admin already present");
        return Ok(false);
    }

    let password_hash = hash_password(&seed.password)?;

    match repo
        .create_user(NewUser {
            name: seed.name.trim().to_string(),
            email: email.clone(),
            password_hash,
            role: Role::Admin,
            is_verified: true,
        })
        .await
    {
        Ok(user) => {
            tracing::info!(user_id = %user.id, email = %email, "bootstrap admin created");
            Ok(true)
        }
        // Another instance won the race.
        Err(RepositoryError::Duplicate(_)) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
