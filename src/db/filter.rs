//! Store predicates.
//!
//! A [`Predicate`] describes which documents of a collection match; it is
//! compiled to a SQL `WHERE` clause and evaluated by SQLite, never in memory.

use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

use crate::models::{AccessLevel, DocId};

/// Queryable document fields across all collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Name,
    Author,
    Access,
    /// Group ids on a page (array)
    PageGroups,
    ArticleTitle,
    ArticleBody,
    /// Member ids of a group (array)
    Members,
    Disabled,
}

impl Field {
    fn expr(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Name => "name",
            Field::Author => "author_id",
            Field::Access => "access",
            Field::PageGroups => "group_ids",
            Field::ArticleTitle => "json_extract(article, '$.title')",
            Field::ArticleBody => "json_extract(article, '$.body')",
            Field::Members => "members",
            Field::Disabled => "disabled",
        }
    }
}

/// A bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
}

impl From<DocId> for Value {
    fn from(id: DocId) -> Self {
        Value::Text(id.to_string())
    }
}

impl From<AccessLevel> for Value {
    fn from(level: AccessLevel) -> Self {
        Value::Text(level.as_str().to_string())
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Int(flag as i64)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

/// Boolean filter expression over one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every document
    All,
    Eq(Field, Value),
    /// Array field holds the value
    Contains(Field, Value),
    /// Array field shares at least one element with the values
    Intersects(Field, Vec<Value>),
    /// Array field holds the id of at least one stored group
    ReferencesGroup(Field),
    /// Case-sensitive substring match
    Substring(Field, String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Predicate::Eq(field, value.into())
    }

    pub fn contains(field: Field, value: impl Into<Value>) -> Self {
        Predicate::Contains(field, value.into())
    }

    pub fn intersects<I, V>(field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::Intersects(field, values.into_iter().map(Into::into).collect())
    }

    /// Compile to a SQL boolean expression and its bind values, in order.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut binds = Vec::new();
        self.write(&mut sql, &mut binds);
        (sql, binds)
    }

    fn write(&self, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Predicate::All => sql.push_str("1"),
            Predicate::Eq(field, value) => {
                sql.push_str(field.expr());
                sql.push_str(" = ?");
                binds.push(value.clone());
            }
            Predicate::Contains(field, value) => {
                sql.push_str("EXISTS (SELECT 1 FROM json_each(");
                sql.push_str(field.expr());
                sql.push_str(") WHERE json_each.value = ?)");
                binds.push(value.clone());
            }
            Predicate::Intersects(_, values) if values.is_empty() => sql.push_str("0"),
            Predicate::Intersects(field, values) => {
                sql.push_str("EXISTS (SELECT 1 FROM json_each(");
                sql.push_str(field.expr());
                sql.push_str(") WHERE json_each.value IN (");
                sql.push_str(&vec!["?"; values.len()].join(", "));
                sql.push_str("))");
                binds.extend(values.iter().cloned());
            }
            Predicate::ReferencesGroup(field) => {
                sql.push_str("EXISTS (SELECT 1 FROM json_each(");
                sql.push_str(field.expr());
                sql.push_str(r#") JOIN "groups" ON "groups".id = json_each.value)"#);
            }
            Predicate::Substring(field, needle) => {
                sql.push_str("instr(");
                sql.push_str(field.expr());
                sql.push_str(", ?) > 0");
                binds.push(Value::Text(needle.clone()));
            }
            Predicate::And(parts) => write_joined(parts, " AND ", "1", sql, binds),
            Predicate::Or(parts) => write_joined(parts, " OR ", "0", sql, binds),
        }
    }
}

fn write_joined(
    parts: &[Predicate],
    separator: &str,
    empty: &str,
    sql: &mut String,
    binds: &mut Vec<Value>,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }

    sql.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push_str(separator);
        }
        sql.push('(');
        part.write(sql, binds);
        sql.push(')');
    }
    sql.push(')');
}

/// Attach compiled bind values to a query, in order.
pub fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: Vec<Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Text(text) => query.bind(text),
            Value::Int(int) => query.bind(int),
        };
    }
    query
}
