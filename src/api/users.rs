//! User API endpoints.

use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    Json,
};

use super::{parse_path_id, success, validate_name, ApiResult};
use crate::access::require_permission;
use crate::auth::{password, RequestContext};
use crate::db::{Field, Predicate, Transaction};
use crate::errors::AppError;
use crate::models::{
    CreateUserRequest, DocId, Permission, UpdatePasswordRequest, UpdatePermissionsRequest, User,
};
use crate::AppState;

const MIN_NAME_LEN: usize = 4;

/// GET /api/users - List enabled users.
pub async fn list_users(
    State(state): State<AppState>,
    _ctx: RequestContext,
) -> ApiResult<Vec<User>> {
    let users = state
        .store
        .find_users(&Predicate::eq(Field::Disabled, false))
        .await?;
    success(users)
}

/// GET /api/users/own - The caller's own profile.
pub async fn get_own_user(ctx: RequestContext) -> ApiResult<User> {
    success(ctx.user)
}

/// GET /api/users/:id - Get a single user.
pub async fn get_user(
    State(state): State<AppState>,
    _ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<User> {
    success(find_user(&state, &id).await?)
}

/// POST /api/users - Register a new user.
pub async fn create_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    require_permission(&ctx.user, Permission::Admin)?;

    // Validate required fields
    let name = validate_name(&request.name, "Name", MIN_NAME_LEN)?;
    let email = request.email.trim().to_string();
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".to_string()));
    }
    password::validate_password_strength(&request.password, state.config.min_password_len)?;

    let user = User {
        id: DocId::new(),
        name,
        email,
        password_hash: hash_off_thread(request.password).await?,
        permissions: request
            .permissions
            .unwrap_or_else(|| BTreeSet::from([Permission::Editor])),
        disabled: false,
    };

    Transaction::begin(state.store.pool())
        .await?
        .insert(&[user.clone()])
        .await
        .commit()
        .await?;

    tracing::info!("User {} created by {}", user.name, ctx.user.name);
    success(user)
}

/// DELETE /api/users/:id - Disable a user. Accounts are never purged.
pub async fn delete_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<User> {
    require_permission(&ctx.user, Permission::Admin)?;

    let mut user = find_user(&state, &id).await?;
    user.disabled = true;

    Transaction::begin(state.store.pool())
        .await?
        .update(&[user.clone()])
        .await
        .commit()
        .await?;

    tracing::info!("User {} disabled by {}", user.name, ctx.user.name);
    success(user)
}

/// PUT /api/users/:id/permissions - Replace a user's permission set.
pub async fn update_permissions(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    Json(request): Json<UpdatePermissionsRequest>,
) -> ApiResult<User> {
    require_permission(&ctx.user, Permission::Admin)?;

    let mut user = find_user(&state, &id).await?;
    user.permissions = request.permissions;

    Transaction::begin(state.store.pool())
        .await?
        .update(&[user.clone()])
        .await
        .commit()
        .await?;

    tracing::info!(
        "Permissions of {} set to {:?} by {}",
        user.name,
        user.permissions,
        ctx.user.name
    );
    success(user)
}

/// PUT /api/password - Change the caller's own password.
pub async fn update_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<UpdatePasswordRequest>,
) -> ApiResult<()> {
    let mut user = ctx.user;

    let hash = user.password_hash.clone();
    let current = request.current_password;
    let verified = tokio::task::spawn_blocking(move || password::verify_password(&hash, &current))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?;
    if !verified {
        return Err(AppError::Validation(
            "Current password is incorrect".to_string(),
        ));
    }

    password::validate_password_strength(&request.new_password, state.config.min_password_len)?;
    user.password_hash = hash_off_thread(request.new_password).await?;

    Transaction::begin(state.store.pool())
        .await?
        .update(&[user.clone()])
        .await
        .commit()
        .await?;

    tracing::info!("User {} changed their password", user.name);
    success(())
}

async fn find_user(state: &AppState, id: &str) -> Result<User, AppError> {
    state
        .store
        .find_user(parse_path_id(id, "User")?)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
}

async fn hash_off_thread(plaintext: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || password::hash_password(&plaintext))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}
