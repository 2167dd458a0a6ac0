/// Router Module Index
///
/// Routes are grouped by the gate that protects them. The gate is applied as a
/// route layer in `create_router`, so an unauthenticated or unauthorized
/// request is rejected before any handler (and any side effect) runs.

/// Routes reachable without a token.
pub mod public;

/// Routes behind the `AuthUser` middleware. Handlers add the finer
/// `VerifiedUser` / `AdminUser` gates themselves.
pub mod authenticated;

/// Routes behind the `AdminUser` middleware, nested under `/api/admin`.
pub mod admin;
