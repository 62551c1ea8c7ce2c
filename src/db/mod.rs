//! Document store backed by SQLite.
//!
//! Each collection is a table keyed by document id; nested values (article,
//! history, id sets) live in JSON text columns so one row is one document and
//! a single-statement update is atomic for that document.

mod accounts;
mod filter;
mod store;
mod transaction;

pub use filter::*;
pub use store::*;
pub use transaction::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            access TEXT NOT NULL DEFAULT 'private',
            article TEXT NOT NULL,
            edited_at INTEGER NOT NULL,
            project_ids TEXT NOT NULL DEFAULT '[]',
            group_ids TEXT NOT NULL DEFAULT '[]',
            history TEXT NOT NULL DEFAULT '[]'
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            permissions TEXT NOT NULL DEFAULT '[]',
            disabled INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "groups" (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            members TEXT NOT NULL DEFAULT '[]'
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            webhook_url TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_pages_edited_at ON pages(edited_at);
        CREATE INDEX IF NOT EXISTS idx_pages_author_id ON pages(author_id);
        CREATE INDEX IF NOT EXISTS idx_pages_access ON pages(access);
        CREATE INDEX IF NOT EXISTS idx_users_disabled ON users(disabled);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
