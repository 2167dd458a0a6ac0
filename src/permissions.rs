//! Role and verification rules.
//!
//! Every gate and every handler that needs a role check goes through
//! [`authorize`] (or [`authorize_user_deletion`]) instead of comparing role
//! strings inline. The same function backs the client-side navigation guard,
//! so both sides of the wire agree on who may see what.

use crate::{
    error::AppError,
    models::{Role, User, UserProfile},
};

/// Principal
///
/// The two facts the rules look at. Built from a stored `User` on the server
/// and from a session's `UserProfile` on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub role: Role,
    pub is_verified: bool,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            role: user.role,
            is_verified: user.is_verified,
        }
    }
}

impl From<&UserProfile> for Principal {
    fn from(profile: &UserProfile) -> Self {
        Self {
            role: profile.role,
            is_verified: profile.is_verified,
        }
    }
}

/// Permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Browse subjects, list materials, obtain download links.
    ReadContent,
    /// Manage users, subjects and uploads.
    Administer,
}

/// DenyReason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The token is valid but the account behind it is gone.
    AccountMissing,
    NotVerified,
    NotAdmin,
    /// Admin accounts cannot be deleted.
    ProtectedAdmin,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::AccountMissing => "Account no longer exists",
            DenyReason::NotVerified => "Your account is not verified yet",
            DenyReason::NotAdmin => "Admin access required",
            DenyReason::ProtectedAdmin => "Cannot delete admin user",
        }
    }
}

impl From<DenyReason> for AppError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::ProtectedAdmin => AppError::BadRequest(reason.message().to_string()),
            _ => AppError::Forbidden(reason.message().to_string()),
        }
    }
}

/// Decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Converts a denial into the matching `AppError`.
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason.into()),
        }
    }
}

/// authorize
///
/// Decides whether `principal` holds `permission`. Admins hold every
/// permission regardless of their verification flag.
pub fn authorize(principal: Principal, permission: Permission) -> Decision {
    match (permission, principal.role) {
        (_, Role::Admin) => Decision::Allow,
        (Permission::ReadContent, Role::User) if principal.is_verified => Decision::Allow,
        (Permission::ReadContent, Role::User) => Decision::Deny(DenyReason::NotVerified),
        (Permission::Administer, Role::User) => Decision::Deny(DenyReason::NotAdmin),
    }
}

/// authorize_loaded
///
/// `authorize` for a record that may have disappeared since the token was
/// issued.
pub fn authorize_loaded(user: Option<&User>, permission: Permission) -> Decision {
    match user {
        Some(user) => authorize(Principal::from(user), permission),
        None => Decision::Deny(DenyReason::AccountMissing),
    }
}

/// authorize_user_deletion
///
/// Deleting a user is an admin action (checked by the gate); this adds the
/// standing rule that the target itself must not be an admin.
pub fn authorize_user_deletion(target: &User) -> Decision {
    if target.is_admin() {
        Decision::Deny(DenyReason::ProtectedAdmin)
    } else {
        Decision::Allow
    }
}
