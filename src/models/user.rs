//! User account model.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::DocId;

/// Independent capability flag held by a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Admin,
    Editor,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Admin => "admin",
            Permission::Editor => "editor",
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: DocId,
    pub name: String,
    pub email: String,
    /// PHC-formatted hash; never leaves the server
    #[serde(skip)]
    pub password_hash: String,
    pub permissions: BTreeSet<Permission>,
    /// Soft delete; disabled accounts cannot sign in and are hidden from listings
    pub disabled: bool,
}

impl User {
    /// Direct set-membership test, no role hierarchy.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Request body for registering a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub permissions: Option<BTreeSet<Permission>>,
}

/// Request body for replacing a user's permission set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePermissionsRequest {
    pub permissions: BTreeSet<Permission>,
}

/// Request body for changing the caller's own password.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}
