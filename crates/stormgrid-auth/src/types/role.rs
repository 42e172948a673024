//! Role type with inheritance.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named bundle of scopes, optionally inheriting from other roles.
///
/// Inheritance forms a DAG over role ids; cycles are rejected when a role
/// is saved, so effective-scope resolution can DFS without depth limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Unique role id.
    pub role_id: Uuid,

    /// Unique role name.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Roles whose scopes this role inherits.
    #[serde(default)]
    pub included_role_ids: Vec<Uuid>,

    /// Scopes granted directly by this role.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Role {
    /// Creates a role with direct scopes and no inheritance.
    #[must_use]
    pub fn new(name: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            included_role_ids: Vec::new(),
            scopes,
        }
    }

    /// Adds an inherited role.
    #[must_use]
    pub fn including(mut self, role_id: Uuid) -> Self {
        self.included_role_ids.push(role_id);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
