//! Project API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{parse_path_id, success, validate_name, ApiResult};
use crate::access::require_permission;
use crate::auth::RequestContext;
use crate::db::{Predicate, Transaction};
use crate::errors::AppError;
use crate::models::{DocId, Permission, Project, ProjectRequest};
use crate::AppState;

/// GET /api/projects - List all projects.
pub async fn list_projects(
    State(state): State<AppState>,
    _ctx: RequestContext,
) -> ApiResult<Vec<Project>> {
    success(state.store.find_projects(&Predicate::All).await?)
}

/// GET /api/projects/:id - Get a single project.
pub async fn get_project(
    State(state): State<AppState>,
    _ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Project> {
    match state.store.find_project(parse_path_id(&id, "Project")?).await? {
        Some(project) => success(project),
        None => Err(AppError::NotFound(format!("Project {} not found", id))),
    }
}

/// POST /api/projects - Create a new project.
pub async fn create_project(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<ProjectRequest>,
) -> ApiResult<Project> {
    require_permission(&ctx.user, Permission::Admin)?;

    let project = Project {
        id: DocId::new(),
        name: validate_name(&request.name, "Name", 1)?,
        webhook_url: normalize_webhook(request.webhook_url)?,
    };

    Transaction::begin(state.store.pool())
        .await?
        .insert(&[project.clone()])
        .await
        .commit()
        .await?;

    tracing::info!("Project {} created by {}", project.name, ctx.user.name);
    success(project)
}

/// PUT /api/projects/:id - Replace a project's name and webhook.
pub async fn update_project(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    Json(request): Json<ProjectRequest>,
) -> ApiResult<Project> {
    require_permission(&ctx.user, Permission::Admin)?;

    let project = Project {
        id: parse_path_id(&id, "Project")?,
        name: validate_name(&request.name, "Name", 1)?,
        webhook_url: normalize_webhook(request.webhook_url)?,
    };

    Transaction::begin(state.store.pool())
        .await?
        .update(&[project.clone()])
        .await
        .commit()
        .await?;

    success(project)
}

/// DELETE /api/projects/:id - Delete a project. Pages keep the dangling id.
pub async fn delete_project(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<()> {
    require_permission(&ctx.user, Permission::Admin)?;

    let project = state
        .store
        .find_project(parse_path_id(&id, "Project")?)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;

    Transaction::begin(state.store.pool())
        .await?
        .delete(&[project])
        .await
        .commit()
        .await?;

    tracing::info!("Project {} deleted by {}", id, ctx.user.name);
    success(())
}

/// Blank means no webhook; anything else must be an http(s) URL.
fn normalize_webhook(url: Option<String>) -> Result<Option<String>, AppError> {
    match url.map(|u| u.trim().to_string()) {
        None => Ok(None),
        Some(u) if u.is_empty() => Ok(None),
        Some(u) if u.starts_with("http://") || u.starts_with("https://") => Ok(Some(u)),
        Some(u) => Err(AppError::Validation(format!("Invalid webhook URL: {}", u))),
    }
}
