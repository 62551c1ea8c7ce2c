//! User, group and project collections.
//!
//! Reads go straight to the pool; writes go through [`Transaction`] via the
//! [`Record`] impls below.
//!
//! [`Transaction`]: super::Transaction

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::filter::{bind_values, Field, Predicate};
use super::store::{parse_id, parse_ids, DocStore};
use super::transaction::Record;
use crate::errors::AppError;
use crate::models::{DocId, Group, Project, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, permissions, disabled";
const GROUP_COLUMNS: &str = "id, name, members";
const PROJECT_COLUMNS: &str = "id, name, webhook_url";

impl DocStore {
    // ==================== USER OPERATIONS ====================

    /// Get a user by ID, disabled or not.
    pub async fn find_user(&self, id: DocId) -> Result<Option<User>, AppError> {
        self.find_users(&Predicate::eq(Field::Id, id))
            .await
            .map(|users| users.into_iter().next())
    }

    /// Get a user by login name.
    pub async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, AppError> {
        self.find_users(&Predicate::eq(Field::Name, name))
            .await
            .map(|users| users.into_iter().next())
    }

    /// List users matching a predicate, ordered by name.
    pub async fn find_users(&self, filter: &Predicate) -> Result<Vec<User>, AppError> {
        let (clause, binds) = filter.to_sql();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause} ORDER BY name");
        let rows = bind_values(sqlx::query(&sql), binds)
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(user_from_row).collect()
    }

    // ==================== GROUP OPERATIONS ====================

    pub async fn find_group(&self, id: DocId) -> Result<Option<Group>, AppError> {
        self.find_groups(&Predicate::eq(Field::Id, id))
            .await
            .map(|groups| groups.into_iter().next())
    }

    /// List groups matching a predicate, ordered by name.
    pub async fn find_groups(&self, filter: &Predicate) -> Result<Vec<Group>, AppError> {
        let (clause, binds) = filter.to_sql();
        let sql = format!("SELECT {GROUP_COLUMNS} FROM \"groups\" WHERE {clause} ORDER BY name");
        let rows = bind_values(sqlx::query(&sql), binds)
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(group_from_row).collect()
    }

    // ==================== PROJECT OPERATIONS ====================

    pub async fn find_project(&self, id: DocId) -> Result<Option<Project>, AppError> {
        self.find_projects(&Predicate::eq(Field::Id, id))
            .await
            .map(|projects| projects.into_iter().next())
    }

    /// List projects matching a predicate, ordered by name.
    pub async fn find_projects(&self, filter: &Predicate) -> Result<Vec<Project>, AppError> {
        let (clause, binds) = filter.to_sql();
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE {clause} ORDER BY name");
        let rows = bind_values(sqlx::query(&sql), binds)
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(project_from_row).collect()
    }
}

// ==================== TRANSACTIONAL WRITES ====================

fn encode_err(err: serde_json::Error) -> sqlx::Error {
    sqlx::Error::Encode(Box::new(err))
}

impl Record for User {
    const KIND: &'static str = "user";

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let permissions = serde_json::to_string(&self.permissions).map_err(encode_err)?;
        let result = sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, permissions, disabled) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id.to_string())
        .bind(&self.name)
        .bind(&self.email)
        .bind(&self.password_hash)
        .bind(permissions)
        .bind(self.disabled as i32)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let permissions = serde_json::to_string(&self.permissions).map_err(encode_err)?;
        let result = sqlx::query(
            "UPDATE users SET name = ?, email = ?, password_hash = ?, permissions = ?, disabled = ? WHERE id = ?",
        )
        .bind(&self.name)
        .bind(&self.email)
        .bind(&self.password_hash)
        .bind(permissions)
        .bind(self.disabled as i32)
        .bind(self.id.to_string())
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(self.id.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}

impl Record for Group {
    const KIND: &'static str = "group";

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let members = serde_json::to_string(&self.members).map_err(encode_err)?;
        let result = sqlx::query("INSERT INTO \"groups\" (id, name, members) VALUES (?, ?, ?)")
            .bind(self.id.to_string())
            .bind(&self.name)
            .bind(members)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let members = serde_json::to_string(&self.members).map_err(encode_err)?;
        let result = sqlx::query("UPDATE \"groups\" SET name = ?, members = ? WHERE id = ?")
            .bind(&self.name)
            .bind(members)
            .bind(self.id.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM \"groups\" WHERE id = ?")
            .bind(self.id.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}

impl Record for Project {
    const KIND: &'static str = "project";

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO projects (id, name, webhook_url) VALUES (?, ?, ?)")
            .bind(self.id.to_string())
            .bind(&self.name)
            .bind(&self.webhook_url)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE projects SET name = ?, webhook_url = ? WHERE id = ?")
            .bind(&self.name)
            .bind(&self.webhook_url)
            .bind(self.id.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(self.id.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}

// Helper functions for row conversion

fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    let permissions: String = row.get("permissions");
    let disabled: i32 = row.get("disabled");
    Ok(User {
        id: parse_id(row.get("id"))?,
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        permissions: serde_json::from_str(&permissions)?,
        disabled: disabled != 0,
    })
}

fn group_from_row(row: &SqliteRow) -> Result<Group, AppError> {
    let members: String = row.get("members");
    Ok(Group {
        id: parse_id(row.get("id"))?,
        name: row.get("name"),
        members: parse_ids(&members)?,
    })
}

fn project_from_row(row: &SqliteRow) -> Result<Project, AppError> {
    Ok(Project {
        id: parse_id(row.get("id"))?,
        name: row.get("name"),
        webhook_url: row.get("webhook_url"),
    })
}
