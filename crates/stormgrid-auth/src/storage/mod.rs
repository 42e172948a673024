//! Storage interfaces for auth-owned records.
//!
//! The control plane pins down these interfaces, not a database. The
//! in-memory backends in [`memory`] are the default deployment; a durable
//! implementation may replace them as long as it preserves the same
//! semantics (atomic refresh-token revocation in particular).

pub mod memory;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{MatchToken, RefreshToken, Role, ServiceClient, User};

/// Storage for user accounts.
///
/// Username uniqueness is case-insensitive and enforced by the store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Stores a new user.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the username is already taken.
    async fn create(&self, user: &User) -> AuthResult<()>;

    /// Replaces an existing user record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the user does not exist, or if a rename
    /// collides with another username.
    async fn update(&self, user: &User) -> AuthResult<()>;

    /// Finds a user by id.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>>;

    /// Finds a user by username, case-insensitively.
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    /// Deletes a user. Returns `true` if one was removed.
    async fn delete(&self, id: Uuid) -> AuthResult<bool>;

    /// Lists all users.
    async fn list(&self) -> AuthResult<Vec<User>>;
}

/// Storage for roles.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Creates or replaces a role.
    ///
    /// Cycle validation happens in the directory service before this is
    /// called; the store only enforces name uniqueness.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the name belongs to a different role.
    async fn save(&self, role: &Role) -> AuthResult<()>;

    /// Finds a role by id.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Role>>;

    /// Finds a role by name.
    async fn find_by_name(&self, name: &str) -> AuthResult<Option<Role>>;

    /// Deletes a role. Returns `true` if one was removed.
    async fn delete(&self, id: Uuid) -> AuthResult<bool>;

    /// Lists all roles.
    async fn list(&self) -> AuthResult<Vec<Role>>;
}

/// Storage for registered service clients.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Creates or replaces a client keyed by `client_id`.
    async fn upsert(&self, client: &ServiceClient) -> AuthResult<()>;

    /// Finds a client by id.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<ServiceClient>>;

    /// Deletes a client. Returns `true` if one was removed.
    async fn delete(&self, client_id: &str) -> AuthResult<bool>;

    /// Lists all clients.
    async fn list(&self) -> AuthResult<Vec<ServiceClient>>;
}

/// Storage for refresh tokens.
///
/// Only token hashes are stored. Revocation must be atomic per token so a
/// presented token can be spent exactly once even under concurrent replay.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Stores a new refresh token record.
    async fn create(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Finds a token by the hash of its opaque value, regardless of
    /// expiry/revocation; callers check `is_active`.
    async fn find_by_hash(&self, hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Finds a token by id.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<RefreshToken>>;

    /// Revokes a token, compare-and-set on `revoked_at`.
    ///
    /// Returns `true` iff this call performed the transition; `false` when
    /// the token was already revoked or does not exist. Exactly one of any
    /// set of concurrent callers observes `true`.
    async fn revoke(&self, id: Uuid, now: OffsetDateTime) -> AuthResult<bool>;

    /// Finds the token rotated from the given one, if a successor exists.
    async fn find_successor(&self, id: Uuid) -> AuthResult<Option<RefreshToken>>;

    /// Deletes expired records. Returns the number removed.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}

/// Storage for match tokens.
#[async_trait]
pub trait MatchTokenStore: Send + Sync {
    /// Stores a new match token.
    async fn create(&self, token: &MatchToken) -> AuthResult<()>;

    /// Finds a match token by id.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<MatchToken>>;

    /// Revokes a match token. Returns `true` iff it transitioned.
    async fn revoke(&self, id: Uuid, now: OffsetDateTime) -> AuthResult<bool>;

    /// Lists tokens issued to one player in one match.
    async fn find_for_player(&self, match_id: &str, player_id: u64)
    -> AuthResult<Vec<MatchToken>>;

    /// Deletes expired records. Returns the number removed.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
