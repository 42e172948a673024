//! Users, roles, and service clients.
//!
//! The directory owns the identity records every grant handler consults.
//! Role inheritance is a DAG of role ids: cycles are rejected when a role is
//! saved, so effective-scope resolution is a bounded DFS.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::password::PasswordHasher;
use crate::storage::{ClientStore, RoleStore, UserStore};
use crate::types::{ClientKind, GrantType, Role, ServiceClient, User};

/// Identity directory over user, role, and client storage.
pub struct Directory {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    clients: Arc<dyn ClientStore>,
    hasher: PasswordHasher,
}

impl Directory {
    /// Creates a directory over the given stores.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        clients: Arc<dyn ClientStore>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            roles,
            clients,
            hasher,
        }
    }

    /// The hasher used for passwords and client secrets.
    #[must_use]
    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Creates a user with a hashed password.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty password or a taken username.
    pub async fn create_user(
        &self,
        username: impl Into<String>,
        password: &str,
        role_ids: Vec<Uuid>,
    ) -> AuthResult<User> {
        let hash = self.hasher.hash(password)?;
        let user = User::new(username, hash, role_ids);
        self.users.create(&user).await?;
        tracing::info!(username = %user.username, user_id = %user.user_id, "Created user");
        Ok(user)
    }

    /// Finds a user by id.
    pub async fn find_user(&self, id: Uuid) -> AuthResult<Option<User>> {
        self.users.find_by_id(id).await
    }

    /// Finds a user by username, case-insensitively.
    pub async fn find_user_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        self.users.find_by_username(username).await
    }

    /// Enables or disables a user.
    pub async fn set_user_enabled(&self, id: Uuid, enabled: bool) -> AuthResult<()> {
        let Some(mut user) = self.users.find_by_id(id).await? else {
            return Err(AuthError::invalid_request("user does not exist"));
        };
        user.enabled = enabled;
        self.users.update(&user).await
    }

    /// Deletes a user. Returns `true` if one was removed.
    pub async fn delete_user(&self, id: Uuid) -> AuthResult<bool> {
        self.users.delete(id).await
    }

    /// Lists all users.
    pub async fn list_users(&self) -> AuthResult<Vec<User>> {
        self.users.list().await
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Creates or replaces a role, rejecting inheritance cycles.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if saving the role would close a cycle in
    /// the inheritance graph, or if the name belongs to another role.
    pub async fn save_role(&self, role: &Role) -> AuthResult<()> {
        if self.would_create_cycle(role).await? {
            return Err(AuthError::invalid_request(format!(
                "role '{}' would create an inheritance cycle",
                role.name
            )));
        }
        self.roles.save(role).await
    }

    /// Finds a role by id.
    pub async fn find_role(&self, id: Uuid) -> AuthResult<Option<Role>> {
        self.roles.find_by_id(id).await
    }

    /// Finds a role by name.
    pub async fn find_role_by_name(&self, name: &str) -> AuthResult<Option<Role>> {
        self.roles.find_by_name(name).await
    }

    /// Deletes a role. Returns `true` if one was removed.
    pub async fn delete_role(&self, id: Uuid) -> AuthResult<bool> {
        self.roles.delete(id).await
    }

    /// Lists all roles.
    pub async fn list_roles(&self) -> AuthResult<Vec<Role>> {
        self.roles.list().await
    }

    async fn would_create_cycle(&self, role: &Role) -> AuthResult<bool> {
        let mut stack = role.included_role_ids.clone();
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == role.role_id {
                return Ok(true);
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(included) = self.roles.find_by_id(id).await? {
                stack.extend(included.included_role_ids.iter().copied());
            }
        }
        Ok(false)
    }

    /// Effective scopes of a user: the union over the transitive closure of
    /// its roles. Deterministically ordered.
    pub async fn resolve_scopes(&self, user: &User) -> AuthResult<Vec<String>> {
        let mut scopes = BTreeSet::new();
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut stack = user.role_ids.clone();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(role) = self.roles.find_by_id(id).await? else {
                // Dangling role reference; skip rather than fail the login.
                tracing::warn!(role_id = %id, user_id = %user.user_id, "User references unknown role");
                continue;
            };
            scopes.extend(role.scopes.iter().cloned());
            stack.extend(role.included_role_ids.iter().copied());
        }

        Ok(scopes.into_iter().collect())
    }

    /// Role names of a user (direct roles only), for token claims.
    pub async fn role_names(&self, user: &User) -> AuthResult<Vec<String>> {
        let mut names = Vec::with_capacity(user.role_ids.len());
        for id in &user.role_ids {
            if let Some(role) = self.roles.find_by_id(*id).await? {
                names.push(role.name);
            }
        }
        Ok(names)
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    /// Registers (or replaces) a service client, hashing its secret.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when a confidential client has no secret or
    /// a public client has one.
    #[allow(clippy::too_many_arguments)]
    pub async fn register_client(
        &self,
        client_id: impl Into<String>,
        kind: ClientKind,
        secret: Option<&str>,
        display_name: impl Into<String>,
        allowed_scopes: Vec<String>,
        allowed_grants: Vec<GrantType>,
        enabled: bool,
    ) -> AuthResult<ServiceClient> {
        let client_id = client_id.into();
        let secret_hash = match (kind, secret) {
            (ClientKind::Confidential, Some(secret)) => Some(self.hasher.hash(secret)?),
            (ClientKind::Confidential, None) => {
                return Err(AuthError::configuration(format!(
                    "confidential client '{client_id}' must have a secret"
                )));
            }
            (ClientKind::Public, None) => None,
            (ClientKind::Public, Some(_)) => {
                return Err(AuthError::configuration(format!(
                    "public client '{client_id}' must not have a secret"
                )));
            }
        };

        let client = ServiceClient {
            client_id,
            kind,
            secret_hash,
            display_name: display_name.into(),
            allowed_scopes,
            allowed_grants,
            enabled,
        };
        self.clients.upsert(&client).await?;
        tracing::info!(client_id = %client.client_id, "Registered service client");
        Ok(client)
    }

    /// Finds a client by id.
    pub async fn find_client(&self, client_id: &str) -> AuthResult<Option<ServiceClient>> {
        self.clients.find_by_client_id(client_id).await
    }

    /// Deletes a client. Returns `true` if one was removed.
    pub async fn delete_client(&self, client_id: &str) -> AuthResult<bool> {
        self.clients.delete(client_id).await
    }

    /// Lists all clients.
    pub async fn list_clients(&self) -> AuthResult<Vec<ServiceClient>> {
        self.clients.list().await
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    /// Authenticates a user by username and password.
    ///
    /// Successful verifications against a hash created under stale cost
    /// parameters rewrite the hash in place.
    ///
    /// # Errors
    ///
    /// Returns a uniform `InvalidGrant` for unknown username, disabled
    /// account, or wrong password, so callers cannot enumerate accounts.
    pub async fn authenticate_user(&self, username: &str, password: &str) -> AuthResult<User> {
        let failure = || AuthError::invalid_grant("invalid username or password");

        let Some(mut user) = self.users.find_by_username(username).await? else {
            return Err(failure());
        };
        if !user.enabled {
            tracing::debug!(username = %user.username, "Login attempt for disabled user");
            return Err(failure());
        }
        if !self.hasher.verify(password, &user.password_hash) {
            return Err(failure());
        }

        if self.hasher.needs_rehash(&user.password_hash) {
            match self.hasher.hash(password) {
                Ok(new_hash) => {
                    user.password_hash = new_hash;
                    if let Err(e) = self.users.update(&user).await {
                        tracing::warn!(error = %e, username = %user.username, "Password rehash not persisted");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, username = %user.username, "Password rehash failed");
                }
            }
        }

        Ok(user)
    }

    /// Authenticates a service client.
    ///
    /// Confidential clients must present their secret; public clients
    /// authenticate by id alone.
    ///
    /// # Errors
    ///
    /// - `ClientNotFound`: no such client id
    /// - `ClientDisabled`: registered but disabled
    /// - `InvalidClient`: missing or wrong secret
    pub async fn authenticate_client(
        &self,
        client_id: &str,
        secret: Option<&str>,
    ) -> AuthResult<ServiceClient> {
        let Some(client) = self.clients.find_by_client_id(client_id).await? else {
            return Err(AuthError::client_not_found(client_id));
        };
        if !client.enabled {
            return Err(AuthError::client_disabled(client_id));
        }

        match client.kind {
            ClientKind::Confidential => {
                let Some(hash) = &client.secret_hash else {
                    return Err(AuthError::internal(format!(
                        "confidential client '{client_id}' has no stored secret"
                    )));
                };
                let Some(secret) = secret else {
                    return Err(AuthError::invalid_client("client secret required"));
                };
                if !self.hasher.verify(secret, hash) {
                    return Err(AuthError::invalid_client("client secret mismatch"));
                }
            }
            ClientKind::Public => {}
        }

        Ok(client)
    }
}
