//! In-memory storage backends.
//!
//! Backed by `dashmap` so reads never block each other and writes lock only
//! the touched shard. Refresh-token revocation relies on the map's per-entry
//! exclusive reference for its compare-and-set.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::user::normalize_username;
use crate::types::{MatchToken, RefreshToken, Role, ServiceClient, User};
use crate::AuthResult;

use super::{ClientStore, MatchTokenStore, RefreshTokenStore, RoleStore, UserStore};

/// In-memory [`UserStore`].
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    by_id: DashMap<Uuid, User>,
    id_by_username: DashMap<String, Uuid>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: &User) -> AuthResult<()> {
        let key = user.username_key();
        match self.id_by_username.entry(key) {
            Entry::Occupied(_) => Err(AuthError::invalid_request(format!(
                "username '{}' is already taken",
                user.username
            ))),
            Entry::Vacant(slot) => {
                slot.insert(user.user_id);
                self.by_id.insert(user.user_id, user.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, user: &User) -> AuthResult<()> {
        let Some(existing) = self.by_id.get(&user.user_id).map(|u| u.clone()) else {
            return Err(AuthError::invalid_request("user does not exist"));
        };

        let old_key = existing.username_key();
        let new_key = user.username_key();
        if old_key != new_key {
            if self.id_by_username.contains_key(&new_key) {
                return Err(AuthError::invalid_request(format!(
                    "username '{}' is already taken",
                    user.username
                )));
            }
            self.id_by_username.remove(&old_key);
            self.id_by_username.insert(new_key, user.user_id);
        }
        self.by_id.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        Ok(self.by_id.get(&id).map(|u| u.clone()))
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let Some(id) = self
            .id_by_username
            .get(&normalize_username(username))
            .map(|id| *id)
        else {
            return Ok(None);
        };
        Ok(self.by_id.get(&id).map(|u| u.clone()))
    }

    async fn delete(&self, id: Uuid) -> AuthResult<bool> {
        let Some((_, user)) = self.by_id.remove(&id) else {
            return Ok(false);
        };
        self.id_by_username.remove(&user.username_key());
        Ok(true)
    }

    async fn list(&self) -> AuthResult<Vec<User>> {
        Ok(self.by_id.iter().map(|u| u.clone()).collect())
    }
}

/// In-memory [`RoleStore`].
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    by_id: DashMap<Uuid, Role>,
    id_by_name: DashMap<String, Uuid>,
}

impl InMemoryRoleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn save(&self, role: &Role) -> AuthResult<()> {
        if let Some(owner) = self.id_by_name.get(&role.name)
            && *owner != role.role_id
        {
            return Err(AuthError::invalid_request(format!(
                "role name '{}' is already taken",
                role.name
            )));
        }
        // Drop a stale name index entry when the role was renamed.
        if let Some(previous) = self.by_id.get(&role.role_id).map(|r| r.name.clone())
            && previous != role.name
        {
            self.id_by_name.remove(&previous);
        }
        self.id_by_name.insert(role.name.clone(), role.role_id);
        self.by_id.insert(role.role_id, role.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Role>> {
        Ok(self.by_id.get(&id).map(|r| r.clone()))
    }

    async fn find_by_name(&self, name: &str) -> AuthResult<Option<Role>> {
        let Some(id) = self.id_by_name.get(name).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.by_id.get(&id).map(|r| r.clone()))
    }

    async fn delete(&self, id: Uuid) -> AuthResult<bool> {
        let Some((_, role)) = self.by_id.remove(&id) else {
            return Ok(false);
        };
        self.id_by_name.remove(&role.name);
        Ok(true)
    }

    async fn list(&self) -> AuthResult<Vec<Role>> {
        Ok(self.by_id.iter().map(|r| r.clone()).collect())
    }
}

/// In-memory [`ClientStore`].
#[derive(Debug, Default)]
pub struct InMemoryClientStore {
    by_id: DashMap<String, ServiceClient>,
}

impl InMemoryClientStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn upsert(&self, client: &ServiceClient) -> AuthResult<()> {
        self.by_id.insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<ServiceClient>> {
        Ok(self.by_id.get(client_id).map(|c| c.clone()))
    }

    async fn delete(&self, client_id: &str) -> AuthResult<bool> {
        Ok(self.by_id.remove(client_id).is_some())
    }

    async fn list(&self) -> AuthResult<Vec<ServiceClient>> {
        Ok(self.by_id.iter().map(|c| c.clone()).collect())
    }
}

/// In-memory [`RefreshTokenStore`].
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    by_id: DashMap<Uuid, RefreshToken>,
    id_by_hash: DashMap<String, Uuid>,
}

impl InMemoryRefreshTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        self.id_by_hash
            .insert(token.opaque_value_hash.clone(), token.token_id);
        self.by_id.insert(token.token_id, token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, hash: &str) -> AuthResult<Option<RefreshToken>> {
        let Some(id) = self.id_by_hash.get(hash).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.by_id.get(&id).map(|t| t.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<RefreshToken>> {
        Ok(self.by_id.get(&id).map(|t| t.clone()))
    }

    async fn revoke(&self, id: Uuid, now: OffsetDateTime) -> AuthResult<bool> {
        // The exclusive entry reference makes the check-and-set atomic.
        let Some(mut entry) = self.by_id.get_mut(&id) else {
            return Ok(false);
        };
        if entry.revoked_at.is_some() {
            return Ok(false);
        }
        entry.revoked_at = Some(now);
        Ok(true)
    }

    async fn find_successor(&self, id: Uuid) -> AuthResult<Option<RefreshToken>> {
        Ok(self
            .by_id
            .iter()
            .find(|t| t.rotated_from == Some(id))
            .map(|t| t.clone()))
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut removed = 0u64;
        let expired: Vec<(Uuid, String)> = self
            .by_id
            .iter()
            .filter(|t| t.is_expired(now))
            .map(|t| (t.token_id, t.opaque_value_hash.clone()))
            .collect();
        for (id, hash) in expired {
            if self.by_id.remove(&id).is_some() {
                self.id_by_hash.remove(&hash);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// In-memory [`MatchTokenStore`].
#[derive(Debug, Default)]
pub struct InMemoryMatchTokenStore {
    by_id: DashMap<Uuid, MatchToken>,
}

impl InMemoryMatchTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchTokenStore for InMemoryMatchTokenStore {
    async fn create(&self, token: &MatchToken) -> AuthResult<()> {
        self.by_id.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<MatchToken>> {
        Ok(self.by_id.get(&id).map(|t| t.clone()))
    }

    async fn revoke(&self, id: Uuid, now: OffsetDateTime) -> AuthResult<bool> {
        let Some(mut entry) = self.by_id.get_mut(&id) else {
            return Ok(false);
        };
        if entry.revoked_at.is_some() {
            return Ok(false);
        }
        entry.revoked_at = Some(now);
        Ok(true)
    }

    async fn find_for_player(
        &self,
        match_id: &str,
        player_id: u64,
    ) -> AuthResult<Vec<MatchToken>> {
        Ok(self
            .by_id
            .iter()
            .filter(|t| t.match_id == match_id && t.player_id == player_id)
            .map(|t| t.clone())
            .collect())
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let before = self.by_id.len();
        self.by_id.retain(|_, t| now <= t.expires_at);
        Ok((before - self.by_id.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn refresh(hash: &str, expires_at: OffsetDateTime) -> RefreshToken {
        RefreshToken {
            token_id: Uuid::new_v4(),
            opaque_value_hash: hash.to_string(),
            subject: "user-1".to_string(),
            client_id: "ops".to_string(),
            scopes: vec![],
            issued_at: OffsetDateTime::UNIX_EPOCH,
            expires_at,
            revoked_at: None,
            rotated_from: None,
        }
    }

    #[tokio::test]
    async fn test_user_store_username_uniqueness() {
        let store = InMemoryUserStore::new();
        let ada = User::new("Ada", "h".to_string(), vec![]);
        store.create(&ada).await.unwrap();

        let dup = User::new("ada", "h".to_string(), vec![]);
        assert!(store.create(&dup).await.is_err());

        let found = store.find_by_username("ADA").await.unwrap().unwrap();
        assert_eq!(found.user_id, ada.user_id);
    }

    #[tokio::test]
    async fn test_user_store_rename() {
        let store = InMemoryUserStore::new();
        let mut ada = User::new("ada", "h".to_string(), vec![]);
        store.create(&ada).await.unwrap();

        ada.username = "ada2".to_string();
        store.update(&ada).await.unwrap();

        assert!(store.find_by_username("ada").await.unwrap().is_none());
        assert!(store.find_by_username("ada2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_role_store_name_uniqueness() {
        let store = InMemoryRoleStore::new();
        let role = Role::new("admin", vec![]);
        store.save(&role).await.unwrap();

        let clash = Role::new("admin", vec![]);
        assert!(store.save(&clash).await.is_err());

        // Re-saving the same role is fine.
        store.save(&role).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_store_revoke_is_single_shot() {
        let store = InMemoryRefreshTokenStore::new();
        let now = OffsetDateTime::UNIX_EPOCH;
        let token = refresh("h1", now + Duration::hours(1));
        store.create(&token).await.unwrap();

        assert!(store.revoke(token.token_id, now).await.unwrap());
        assert!(!store.revoke(token.token_id, now).await.unwrap());
        assert!(!store.revoke(Uuid::new_v4(), now).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_store_successor_lookup() {
        let store = InMemoryRefreshTokenStore::new();
        let now = OffsetDateTime::UNIX_EPOCH;
        let first = refresh("h1", now + Duration::hours(1));
        let mut second = refresh("h2", now + Duration::hours(1));
        second.rotated_from = Some(first.token_id);
        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();

        let successor = store.find_successor(first.token_id).await.unwrap().unwrap();
        assert_eq!(successor.token_id, second.token_id);
        assert!(store.find_successor(second.token_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_store_cleanup() {
        let store = InMemoryRefreshTokenStore::new();
        let now = OffsetDateTime::UNIX_EPOCH;
        store
            .create(&refresh("old", now - Duration::seconds(1)))
            .await
            .unwrap();
        store
            .create(&refresh("live", now + Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(store.cleanup_expired(now).await.unwrap(), 1);
        assert!(store.find_by_hash("old").await.unwrap().is_none());
        assert!(store.find_by_hash("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_match_token_store_player_lookup() {
        let store = InMemoryMatchTokenStore::new();
        let now = OffsetDateTime::UNIX_EPOCH;
        let token = MatchToken {
            id: Uuid::new_v4(),
            match_id: "m-1".to_string(),
            container_id: None,
            player_id: 2,
            user_id: None,
            player_name: "Ada".to_string(),
            scopes: vec![],
            created_at: now,
            expires_at: now + Duration::minutes(30),
            revoked_at: None,
        };
        store.create(&token).await.unwrap();

        assert_eq!(store.find_for_player("m-1", 2).await.unwrap().len(), 1);
        assert!(store.find_for_player("m-1", 3).await.unwrap().is_empty());
        assert!(store.find_for_player("m-2", 2).await.unwrap().is_empty());
    }
}
