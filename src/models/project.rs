//! Project model.

use serde::{Deserialize, Serialize};

use super::DocId;

/// A project pages can be filed under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: DocId,
    pub name: String,
    /// Receives a JSON `{"text": ...}` POST whenever a page of this project changes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Request body for creating or replacing a project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    pub name: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
}
