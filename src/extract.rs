//! Request extractors whose rejections are `AppError`s.
//!
//! axum's own `Json` and `Path` reject with plain-text bodies. These wrappers
//! run the same parsing but route every failure through `AppError`, so
//! malformed input gets the usual `{"message": ...}` JSON response.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Typed URL path parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);
