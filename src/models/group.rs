//! Access-control group model.

use serde::{Deserialize, Serialize};

use super::DocId;

/// A named set of users granted visibility of `group`-level pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: DocId,
    pub name: String,
    pub members: Vec<DocId>,
}

/// Request body for creating or replacing a group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<DocId>,
}
