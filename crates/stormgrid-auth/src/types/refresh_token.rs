//! Refresh token record.
//!
//! The opaque value handed to the client is never stored; only its SHA-256
//! hash is. Presenting a refresh token revokes it and issues a successor
//! linked via `rotated_from`, so a stolen-and-replayed token surfaces as a
//! reuse of a revoked record.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A single-use refresh token record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// Unique id of this record.
    pub token_id: Uuid,

    /// SHA-256 hash of the opaque value returned to the client.
    pub opaque_value_hash: String,

    /// Subject the token was issued for (user id).
    pub subject: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// Scopes the rotation chain carries.
    pub scopes: Vec<String>,

    /// When this record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// When this record expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When this record was revoked, if ever.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,

    /// Predecessor in the rotation chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotated_from: Option<Uuid>,
}

impl RefreshToken {
    /// Returns `true` if this token is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// Returns `true` if this token has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Returns `true` if this token can still be exchanged at `now`.
    #[must_use]
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        !self.is_expired(now) && !self.is_revoked()
    }

    /// Hashes an opaque token value for storage or lookup.
    #[must_use]
    pub fn hash_value(value: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generates a fresh opaque token value (256-bit, base64url).
    #[must_use]
    pub fn generate_value() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}
