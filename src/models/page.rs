//! Page, article and history models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DocId;

/// Visibility classification of a page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Public,
    Group,
    #[default]
    Private,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Group => "group",
            AccessLevel::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(AccessLevel::Public),
            "group" => Some(AccessLevel::Group),
            "private" => Some(AccessLevel::Private),
            _ => None,
        }
    }
}

/// The current content of a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Fresh on every edit; the matching history entry reuses it once replaced
    pub id: DocId,
    pub title: String,
    /// Markdown source
    pub body: String,
    pub editor_user_id: DocId,
    pub edited_at: DateTime<Utc>,
}

/// Immutable, compressed snapshot of a replaced article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub id: DocId,
    #[serde(with = "base64_bytes")]
    pub compressed_title: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub compressed_body: Vec<u8>,
    pub editor_user_id: DocId,
    pub edited_at: DateTime<Utc>,
}

/// A history entry with its text restored, for display.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: DocId,
    pub title: String,
    pub body: String,
    pub editor_user_id: DocId,
    pub edited_at: DateTime<Utc>,
}

/// The unit of visibility and access control.
///
/// `history` is append-only and never serialized to API clients; it is
/// empty whenever the page was fetched without its history.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: DocId,
    pub author_id: DocId,
    pub article: Article,
    #[serde(skip)]
    pub history: Vec<History>,
    pub projects: Vec<DocId>,
    pub access: AccessLevel,
    pub groups: Vec<DocId>,
}

/// Initial values for a page being created.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub access: AccessLevel,
    #[serde(default)]
    pub projects: Vec<DocId>,
    #[serde(default)]
    pub groups: Vec<DocId>,
}

/// Request body for saving an edit to an existing page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePageRequest {
    /// Article revision the edit was based on
    #[serde(default)]
    pub article_id: Option<DocId>,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub access: Option<AccessLevel>,
    #[serde(default)]
    pub projects: Option<Vec<DocId>>,
    #[serde(default)]
    pub groups: Option<Vec<DocId>>,
}

/// Query parameters for page listing.
#[derive(Debug, Default, Deserialize)]
pub struct PageListQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// Serde adapter storing raw bytes as base64 text inside JSON documents.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
