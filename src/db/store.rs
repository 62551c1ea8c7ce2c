//! Page collection.
//!
//! Every operation is a single statement, so a page row is always read and
//! written whole. Saving an edit replaces the article and appends to the
//! history in one `UPDATE`.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::filter::{bind_values, Field, Predicate};
use crate::errors::AppError;
use crate::models::{AccessLevel, Article, DocId, History, Page};

const PAGE_COLUMNS: &str = "id, author_id, access, article, project_ids, group_ids";

/// Which parts of a page document to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Full,
    /// Skip the history array; `Page::history` comes back empty.
    WithoutHistory,
}

impl Projection {
    fn history_column(self) -> &'static str {
        match self {
            Projection::Full => "history",
            Projection::WithoutHistory => "'[]' AS history",
        }
    }
}

/// Result ordering for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    /// Most recently edited first
    EditedAtDesc,
}

impl Sort {
    fn page_order(self) -> &'static str {
        match self {
            Sort::EditedAtDesc => "edited_at DESC, id DESC",
        }
    }
}

/// The fields an edit replaces.
#[derive(Debug, Clone, Copy)]
pub struct PageUpdate<'a> {
    pub article: &'a Article,
    pub access: AccessLevel,
    pub projects: &'a [DocId],
    pub groups: &'a [DocId],
}

impl<'a> PageUpdate<'a> {
    pub fn of(page: &'a Page) -> Self {
        Self {
            article: &page.article,
            access: page.access,
            projects: &page.projects,
            groups: &page.groups,
        }
    }
}

/// Handle on the document collections, cheap to clone and shared by all requests.
#[derive(Clone)]
pub struct DocStore {
    pool: SqlitePool,
}

impl DocStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ==================== PAGE OPERATIONS ====================

    /// Insert a new page document.
    pub async fn insert_page(&self, page: &Page) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO pages (id, author_id, access, article, edited_at, project_ids, group_ids, history) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(page.id.to_string())
        .bind(page.author_id.to_string())
        .bind(page.access.as_str())
        .bind(serde_json::to_string(&page.article)?)
        .bind(page.article.edited_at.timestamp_micros())
        .bind(ids_json(&page.projects)?)
        .bind(ids_json(&page.groups)?)
        .bind(serde_json::to_string(&page.history)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a page by ID.
    pub async fn find_page(
        &self,
        id: DocId,
        projection: Projection,
    ) -> Result<Option<Page>, AppError> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS}, {} FROM pages WHERE id = ?",
            projection.history_column()
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(page_from_row).transpose()
    }

    /// List pages matching a predicate.
    pub async fn find_pages(
        &self,
        filter: &Predicate,
        projection: Projection,
        sort: Sort,
    ) -> Result<Vec<Page>, AppError> {
        let (clause, binds) = filter.to_sql();
        let sql = format!(
            "SELECT {PAGE_COLUMNS}, {} FROM pages WHERE {clause} ORDER BY {}",
            projection.history_column(),
            sort.page_order()
        );
        let rows = bind_values(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(page_from_row).collect()
    }

    /// Replace the editable fields of a page and optionally append one history
    /// entry, in a single statement.
    ///
    /// With `expected_article_id`, the write only applies while the stored
    /// article still carries that id. Returns the number of rows changed.
    pub async fn update_page(
        &self,
        id: DocId,
        update: &PageUpdate<'_>,
        pushed_history: Option<&History>,
        expected_article_id: Option<DocId>,
    ) -> Result<u64, AppError> {
        let mut sql = String::from(
            "UPDATE pages SET article = ?, edited_at = ?, access = ?, project_ids = ?, group_ids = ?",
        );
        if pushed_history.is_some() {
            sql.push_str(", history = json_insert(history, '$[#]', json(?))");
        }
        sql.push_str(" WHERE id = ?");
        if expected_article_id.is_some() {
            sql.push_str(" AND json_extract(article, '$.id') = ?");
        }

        let mut query = sqlx::query(&sql)
            .bind(serde_json::to_string(update.article)?)
            .bind(update.article.edited_at.timestamp_micros())
            .bind(update.access.as_str())
            .bind(ids_json(update.projects)?)
            .bind(ids_json(update.groups)?);
        if let Some(entry) = pushed_history {
            query = query.bind(serde_json::to_string(entry)?);
        }
        query = query.bind(id.to_string());
        if let Some(expected) = expected_article_id {
            query = query.bind(expected.to_string());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Count pages matching a predicate.
    pub async fn count_pages(&self, filter: &Predicate) -> Result<i64, AppError> {
        let (clause, binds) = filter.to_sql();
        let sql = format!("SELECT COUNT(*) AS n FROM pages WHERE {clause}");
        let row = bind_values(sqlx::query(&sql), binds)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Whether a page with this ID exists.
    pub async fn page_exists(&self, id: DocId) -> Result<bool, AppError> {
        Ok(self.count_pages(&Predicate::eq(Field::Id, id)).await? > 0)
    }
}

// Helper functions for row conversion

fn page_from_row(row: &SqliteRow) -> Result<Page, AppError> {
    let access: String = row.get("access");
    let article: String = row.get("article");
    let projects: String = row.get("project_ids");
    let groups: String = row.get("group_ids");
    let history: String = row.get("history");

    Ok(Page {
        id: parse_id(row.get("id"))?,
        author_id: parse_id(row.get("author_id"))?,
        article: serde_json::from_str(&article)?,
        history: serde_json::from_str(&history)?,
        projects: parse_ids(&projects)?,
        access: AccessLevel::from_str(&access)
            .ok_or_else(|| AppError::Storage(format!("Unknown access level: {}", access)))?,
        groups: parse_ids(&groups)?,
    })
}

pub(super) fn parse_id(text: String) -> Result<DocId, AppError> {
    text.parse()
        .map_err(|_| AppError::Storage(format!("Corrupt document id in store: {}", text)))
}

pub(super) fn parse_ids(json: &str) -> Result<Vec<DocId>, AppError> {
    Ok(serde_json::from_str(json)?)
}

pub(super) fn ids_json(ids: &[DocId]) -> Result<String, AppError> {
    Ok(serde_json::to_string(ids)?)
}
