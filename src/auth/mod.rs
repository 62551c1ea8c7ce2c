//! HTTP Basic authentication.
//!
//! The middleware resolves the caller from `Authorization: Basic` credentials
//! and hands the user to handlers as a typed [`RequestContext`].

pub mod password;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::db::DocStore;
use crate::errors::AppError;
use crate::models::User;

/// The authenticated caller of the current request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))
    }
}

/// Basic-auth layer: rejects the request unless the credentials match an
/// enabled account.
pub async fn basic_auth_layer(
    State(store): State<DocStore>,
    mut request: Request,
    next: Next,
) -> Response {
    let credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_credentials);

    let Some((name, password)) = credentials else {
        return unauthorized_response("Missing or malformed credentials");
    };

    match authenticate(&store, &name, password).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(RequestContext { user });
            next.run(request).await
        }
        Ok(None) => {
            tracing::debug!("Rejected credentials for {}", name);
            unauthorized_response("Invalid credentials")
        }
        Err(e) => e.into_response(),
    }
}

/// Look up `name` and verify `password`. Disabled accounts never authenticate.
pub async fn authenticate(
    store: &DocStore,
    name: &str,
    password: String,
) -> Result<Option<User>, AppError> {
    let Some(user) = store.find_user_by_name(name).await? else {
        return Ok(None);
    };
    if user.disabled {
        return Ok(None);
    }

    // Argon2 verification is CPU-bound; run it off the async workers
    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || password::verify_password(&hash, &password))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?;

    Ok(verified.then_some(user))
}

/// Decode an `Authorization` header value of the form `Basic base64(name:password)`.
fn parse_basic_credentials(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, password) = decoded.split_once(':')?;
    Some((name.to_string(), password.to_string()))
}

/// Create an unauthorized response with a Basic challenge.
fn unauthorized_response(message: &str) -> Response {
    let mut response = AppError::Unauthorized(message.to_string()).into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"wiki\""),
    );
    response
}
