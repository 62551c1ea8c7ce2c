//! Page API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{success, ApiResult};
use crate::access::{can_view, require_permission};
use crate::auth::RequestContext;
use crate::errors::AppError;
use crate::models::{HistoryEntry, NewPage, Page, PageListQuery, Permission, SavePageRequest};
use crate::AppState;

/// GET /api/pages - List pages visible to the caller, optionally searched with `?q=`.
pub async fn list_pages(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<PageListQuery>,
) -> ApiResult<Vec<Page>> {
    let pages = state
        .engine
        .list_visible_pages(&ctx.user, query.q.as_deref())
        .await?;
    success(pages)
}

/// GET /api/pages/own - List pages authored by the caller.
pub async fn list_own_pages(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Vec<Page>> {
    success(state.engine.list_own_pages(&ctx.user).await?)
}

/// POST /api/pages - Create a new page.
pub async fn create_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<NewPage>,
) -> ApiResult<Page> {
    require_permission(&ctx.user, Permission::Editor)?;
    success(state.engine.create_page(&ctx.user, request).await?)
}

/// GET /api/pages/:id - Get a single page.
pub async fn get_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Page> {
    success(load_viewable(&state, &ctx, &id).await?)
}

/// GET /api/pages/:id/history - Get the decompressed edit history of a page.
pub async fn get_page_history(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Vec<HistoryEntry>> {
    let page = load_viewable(&state, &ctx, &id).await?;
    success(state.engine.page_history(&page)?)
}

/// POST /api/pages/:id - Save an edit to a page.
pub async fn save_page(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    Json(request): Json<SavePageRequest>,
) -> ApiResult<Page> {
    require_permission(&ctx.user, Permission::Editor)?;
    let mut page = load_viewable(&state, &ctx, &id).await?;

    match request.article_id {
        Some(article_id) => page.article.id = article_id,
        None if state.config.strict_save => {
            return Err(AppError::Validation(
                "articleId of the edited revision is required".to_string(),
            ));
        }
        None => {}
    }
    page.article.title = request.title;
    page.article.body = request.body;
    if let Some(access) = request.access {
        page.access = access;
    }
    if let Some(projects) = request.projects {
        page.projects = projects;
    }
    if let Some(groups) = request.groups {
        page.groups = groups;
    }

    state.engine.save_page(&mut page, &ctx.user).await?;
    success(page)
}

/// Load a page the caller may open; anything else is reported as missing.
async fn load_viewable(state: &AppState, ctx: &RequestContext, id: &str) -> Result<Page, AppError> {
    let page = state.engine.load_page(id).await?;
    let groups = state.engine.visible_group_ids(&ctx.user).await?;

    if !can_view(&ctx.user, &page, &groups) {
        tracing::debug!("Page {} hidden from {}", page.id, ctx.user.name);
        return Err(AppError::NotFound(format!("Page {} not found", id)));
    }
    Ok(page)
}
