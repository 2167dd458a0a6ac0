use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::AppError;

/// PasswordError
///
/// Failures of the hashing primitives. A wrong password is not an error;
/// `verify_password` returns `Ok(false)` for it.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    InvalidHash(String),

    #[error("failed to verify password: {0}")]
    Verify(String),
}

/// hash_password
///
/// Hashes a plaintext password with Argon2id (crate default parameters) and a
/// fresh random salt, returning the PHC string stored in `users.password_hash`.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// verify_password
///
/// Constant-time check of `password` against a stored PHC hash. The hash
/// carries its own parameters, so older hashes keep verifying after a
/// parameter change.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Verify(e.to_string())),
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}
