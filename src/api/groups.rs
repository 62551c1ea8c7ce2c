//! Group API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{parse_path_id, success, validate_name, ApiResult};
use crate::access::{group_visibility_filter, require_permission};
use crate::auth::RequestContext;
use crate::db::{Field, Predicate, Transaction};
use crate::errors::AppError;
use crate::models::{DocId, Group, GroupRequest, Permission};
use crate::AppState;

/// GET /api/groups - List groups visible to the caller.
pub async fn list_groups(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Vec<Group>> {
    let groups = state
        .store
        .find_groups(&group_visibility_filter(&ctx.user))
        .await?;
    success(groups)
}

/// GET /api/groups/:id - Get a single group the caller may see.
pub async fn get_group(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Group> {
    let group_id = parse_path_id(&id, "Group")?;
    let filter = Predicate::And(vec![
        Predicate::eq(Field::Id, group_id),
        group_visibility_filter(&ctx.user),
    ]);

    match state.store.find_groups(&filter).await?.pop() {
        Some(group) => success(group),
        None => Err(AppError::NotFound(format!("Group {} not found", id))),
    }
}

/// POST /api/groups - Create a new group.
pub async fn create_group(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<GroupRequest>,
) -> ApiResult<Group> {
    require_permission(&ctx.user, Permission::Admin)?;

    let group = Group {
        id: DocId::new(),
        name: validate_name(&request.name, "Name", 1)?,
        members: dedup(request.members),
    };

    Transaction::begin(state.store.pool())
        .await?
        .insert(&[group.clone()])
        .await
        .commit()
        .await?;

    tracing::info!("Group {} created by {}", group.name, ctx.user.name);
    success(group)
}

/// PUT /api/groups/:id - Replace a group's name and members.
pub async fn update_group(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    Json(request): Json<GroupRequest>,
) -> ApiResult<Group> {
    require_permission(&ctx.user, Permission::Admin)?;

    let group = Group {
        id: parse_path_id(&id, "Group")?,
        name: validate_name(&request.name, "Name", 1)?,
        members: dedup(request.members),
    };

    Transaction::begin(state.store.pool())
        .await?
        .update(&[group.clone()])
        .await
        .commit()
        .await?;

    success(group)
}

/// DELETE /api/groups/:id - Delete a group. Pages keep the dangling id.
pub async fn delete_group(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<()> {
    require_permission(&ctx.user, Permission::Admin)?;

    let group = state
        .store
        .find_group(parse_path_id(&id, "Group")?)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))?;

    Transaction::begin(state.store.pool())
        .await?
        .delete(&[group])
        .await
        .commit()
        .await?;

    tracing::info!("Group {} deleted by {}", id, ctx.user.name);
    success(())
}

/// Member ids form a set.
fn dedup(mut ids: Vec<DocId>) -> Vec<DocId> {
    ids.sort();
    ids.dedup();
    ids
}
