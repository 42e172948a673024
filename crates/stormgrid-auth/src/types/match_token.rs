//! Match token record.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A short-lived per-player capability to act inside one match.
///
/// The JWT handed to the player embeds the match claims; this record is the
/// revocable server-side half consulted by `validate_for`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchToken {
    /// Unique id of this token.
    pub id: Uuid,

    /// Match the token grants access to.
    pub match_id: String,

    /// Container hosting the match, when container-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,

    /// Player slot inside the match.
    pub player_id: u64,

    /// Platform account behind the player, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// Display name of the player.
    pub player_name: String,

    /// Scopes the token carries.
    pub scopes: Vec<String>,

    /// When the token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When the token was revoked, if ever.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,
}

impl MatchToken {
    /// Returns `true` if the token is neither expired nor revoked at `now`.
    #[must_use]
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && now <= self.expires_at
    }
}
