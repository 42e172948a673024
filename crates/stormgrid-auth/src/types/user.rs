//! User account type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human account known to the control plane.
///
/// Usernames are unique case-insensitively; lookups normalize before
/// comparing. The password is stored only as an Argon2 PHC hash, which is
/// rewritten when the configured cost changes and the user next logs in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user id.
    pub user_id: Uuid,

    /// Login name, unique case-insensitively.
    pub username: String,

    /// Argon2 hash of the password; never the plaintext.
    #[serde(default, skip_serializing)]
    pub password_hash: String,

    /// Roles assigned to this user.
    pub role_ids: Vec<Uuid>,

    /// Disabled users fail authentication without revealing why.
    pub enabled: bool,
}

impl User {
    /// Creates an enabled user with the given hash and roles.
    #[must_use]
    pub fn new(username: impl Into<String>, password_hash: String, role_ids: Vec<Uuid>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            username: username.into(),
            password_hash,
            role_ids,
            enabled: true,
        }
    }

    /// The normalized form used for uniqueness and lookups.
    #[must_use]
    pub fn username_key(&self) -> String {
        normalize_username(&self.username)
    }
}

/// Normalizes a username for case-insensitive comparison.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.to_lowercase()
}
