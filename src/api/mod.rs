//! REST API module.
//!
//! Thin JSON handlers over the engine and the store. Authentication happens
//! in middleware; handlers receive the caller as a [`RequestContext`].
//!
//! [`RequestContext`]: crate::auth::RequestContext

mod groups;
mod pages;
mod projects;
mod users;

pub use groups::*;
pub use pages::*;
pub use projects::*;
pub use users::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::DocId;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Parse a path id; a malformed id names nothing, so it is reported as missing.
fn parse_path_id(id: &str, kind: &str) -> Result<DocId, AppError> {
    id.parse()
        .map_err(|_| AppError::NotFound(format!("{} {} not found", kind, id)))
}

/// Require a non-blank name of at least `min` characters.
fn validate_name(name: &str, field: &str, min: usize) -> Result<String, AppError> {
    let name = name.trim();
    if name.chars().count() < min.max(1) {
        return Err(AppError::Validation(if min > 1 {
            format!("{field} must be at least {min} characters long")
        } else {
            format!("{field} is required")
        }));
    }
    Ok(name.to_string())
}
