//! OAuth 2.0 grant dispatcher.
//!
//! Every path through this service authenticates the calling client, runs
//! the rate limiter, and narrows scopes with the wildcard matcher. Refresh
//! tokens rotate on use: the presented token is revoked (compare-and-set,
//! so concurrent replays lose) before the successor is minted, and a replay
//! of an already-revoked token burns the whole rotation chain.
//!
//! Authentication failures are flattened with a constant ~100 ms response
//! delay plus jitter.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use stormgrid_core::Clock;
use uuid::Uuid;

use crate::config::TokenTtlConfig;
use crate::directory::Directory;
use crate::error::{AuthError, AuthResult};
use crate::rate_limit::{RateLimiter, client_key, user_key};
use crate::scope;
use crate::storage::RefreshTokenStore;
use crate::token::jwt::{AccessTokenClaims, JwtService};
use crate::types::{GrantType, RefreshToken, ServiceClient, User};

use super::request::{TokenRequest, TokenResponse};

/// Subject token types accepted by the token-exchange grant.
const SUBJECT_TOKEN_TYPES: &[&str] = &[
    "urn:ietf:params:oauth:token-type:jwt",
    "urn:ietf:params:oauth:token-type:access_token",
];

/// Base delay applied to failed authentications.
const FAILURE_DELAY: Duration = Duration::from_millis(100);
/// Random jitter added on top of the base delay, in milliseconds.
const FAILURE_JITTER_MS: u64 = 50;

/// OAuth 2.0 token service.
pub struct TokenService {
    directory: Arc<Directory>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    jwt: Arc<JwtService>,
    rate_limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    ttls: TokenTtlConfig,
    failure_delay: Duration,
}

impl TokenService {
    /// Creates a token service.
    #[must_use]
    pub fn new(
        directory: Arc<Directory>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        jwt: Arc<JwtService>,
        rate_limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        ttls: TokenTtlConfig,
    ) -> Self {
        Self {
            directory,
            refresh_tokens,
            jwt,
            rate_limiter,
            clock,
            ttls,
            failure_delay: FAILURE_DELAY,
        }
    }

    /// Overrides the failure delay; tests set it to zero.
    #[must_use]
    pub fn with_failure_delay(mut self, delay: Duration) -> Self {
        self.failure_delay = delay;
        self
    }

    /// The JWT service tokens are signed with.
    #[must_use]
    pub fn jwt(&self) -> &Arc<JwtService> {
        &self.jwt
    }

    /// Verifies an access token and returns its claims.
    ///
    /// # Errors
    ///
    /// See [`JwtService::verify`].
    pub fn validate(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        self.jwt.verify(token)
    }

    /// Dispatches a token request on its grant type.
    ///
    /// `client_ip` keys the rate limiter together with the client id (and
    /// username, for the password grant).
    ///
    /// # Errors
    ///
    /// Returns the RFC 6749 error kinds from §7; authentication failures
    /// are additionally delayed by the configured constant.
    pub async fn grant(&self, request: TokenRequest, client_ip: &str) -> AuthResult<TokenResponse> {
        let result = self.dispatch(&request, client_ip).await;
        if let Err(err) = &result {
            tracing::debug!(
                grant_type = %request.grant_type,
                client_id = request.client_id.as_deref().unwrap_or("-"),
                error = %err.kind(),
                "Token request failed"
            );
            if err.is_authentication_failure() {
                self.delay_failure().await;
            }
        }
        result
    }

    async fn dispatch(&self, request: &TokenRequest, client_ip: &str) -> AuthResult<TokenResponse> {
        let Some(grant_type) = GrantType::parse(&request.grant_type) else {
            return Err(AuthError::unsupported_grant_type(&request.grant_type));
        };

        let Some(client_id) = request.client_id.as_deref() else {
            return Err(AuthError::invalid_request("client_id is required"));
        };

        if !self.rate_limiter.try_acquire(&client_key(client_id, client_ip)) {
            return Err(self.rate_limited(&client_key(client_id, client_ip)));
        }

        match grant_type {
            GrantType::ClientCredentials => self.client_credentials(request, client_id).await,
            GrantType::Password => self.password(request, client_id, client_ip).await,
            GrantType::RefreshToken => self.refresh(request, client_id).await,
            GrantType::TokenExchange => self.token_exchange(request, client_id).await,
        }
    }

    // ------------------------------------------------------------------
    // client_credentials
    // ------------------------------------------------------------------

    async fn client_credentials(
        &self,
        request: &TokenRequest,
        client_id: &str,
    ) -> AuthResult<TokenResponse> {
        let client = self
            .authenticate(client_id, request.client_secret.as_deref(), GrantType::ClientCredentials)
            .await?;

        let requested = scope::split(request.scope.as_deref().unwrap_or_default());
        let effective = effective_client_scopes(&client, &requested)?;

        let ttl = self.ttls.service_token_ttl;
        let claims = AccessTokenClaims::for_subject(&client.client_id)
            .with_client(&client.client_id)
            .with_scopes(effective.clone());
        let access_token = self.jwt.issue(claims, ttl)?;

        tracing::info!(client_id = %client.client_id, "Issued service token");
        Ok(TokenResponse::new(
            access_token,
            ttl.as_secs(),
            scope::join(&effective),
        ))
    }

    // ------------------------------------------------------------------
    // password
    // ------------------------------------------------------------------

    async fn password(
        &self,
        request: &TokenRequest,
        client_id: &str,
        client_ip: &str,
    ) -> AuthResult<TokenResponse> {
        let client = self
            .authenticate(client_id, request.client_secret.as_deref(), GrantType::Password)
            .await?;

        let Some(username) = request.username.as_deref() else {
            return Err(AuthError::invalid_request("username is required"));
        };
        let Some(password) = request.password.as_deref() else {
            return Err(AuthError::invalid_request("password is required"));
        };

        if !self.rate_limiter.try_acquire(&user_key(username, client_ip)) {
            return Err(self.rate_limited(&user_key(username, client_ip)));
        }

        let user = self.directory.authenticate_user(username, password).await?;
        let user_scopes = self.directory.resolve_scopes(&user).await?;

        // The user's grant, narrowed to what the client may carry.
        let grantable: Vec<String> = user_scopes
            .iter()
            .filter(|s| scope::covered(&client.allowed_scopes, s))
            .cloned()
            .collect();

        let requested = scope::split(request.scope.as_deref().unwrap_or_default());
        let effective = if requested.is_empty() {
            grantable
        } else {
            let missing = scope::missing(&grantable, &requested);
            if !missing.is_empty() {
                return Err(AuthError::invalid_scope(format!(
                    "requested scopes not granted: {}",
                    missing.join(" ")
                )));
            }
            requested
        };

        let ttl = self.ttls.user_token_ttl;
        let roles = self.directory.role_names(&user).await?;
        let claims = AccessTokenClaims::for_subject(user.user_id.to_string())
            .with_user(user.user_id.to_string(), &user.username)
            .with_client(&client.client_id)
            .with_roles(roles)
            .with_scopes(effective.clone());
        let access_token = self.jwt.issue(claims, ttl)?;

        let refresh_value = self.mint_refresh_token(&user, &client, &effective, None).await?;

        tracing::info!(username = %user.username, client_id = %client.client_id, "Issued user token");
        Ok(
            TokenResponse::new(access_token, ttl.as_secs(), scope::join(&effective))
                .with_refresh_token(refresh_value),
        )
    }

    // ------------------------------------------------------------------
    // refresh_token
    // ------------------------------------------------------------------

    async fn refresh(&self, request: &TokenRequest, client_id: &str) -> AuthResult<TokenResponse> {
        let client = self
            .authenticate(client_id, request.client_secret.as_deref(), GrantType::RefreshToken)
            .await?;

        let Some(presented) = request.refresh_token.as_deref() else {
            return Err(AuthError::invalid_request("refresh_token is required"));
        };

        let hash = RefreshToken::hash_value(presented);
        let Some(record) = self.refresh_tokens.find_by_hash(&hash).await? else {
            return Err(AuthError::invalid_grant("unknown refresh token"));
        };

        if record.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "refresh token was issued to another client",
            ));
        }

        let now = self.clock.now();
        if record.is_revoked() {
            // Reuse of a spent token means the value leaked; burn the chain.
            self.revoke_chain(&record).await?;
            return Err(AuthError::invalid_grant("refresh token reuse detected"));
        }
        if record.is_expired(now) {
            return Err(AuthError::invalid_grant("refresh token expired"));
        }

        // Validate any narrowing before spending the token, so a bad
        // scope parameter does not burn the chain link.
        let requested = scope::split(request.scope.as_deref().unwrap_or_default());
        let effective = if requested.is_empty() {
            record.scopes.clone()
        } else {
            let missing = scope::missing(&record.scopes, &requested);
            if !missing.is_empty() {
                return Err(AuthError::invalid_scope(format!(
                    "requested scopes exceed the refresh grant: {}",
                    missing.join(" ")
                )));
            }
            requested
        };

        // Single use: exactly one concurrent presenter wins this CAS.
        if !self.refresh_tokens.revoke(record.token_id, now).await? {
            self.revoke_chain(&record).await?;
            return Err(AuthError::invalid_grant("refresh token reuse detected"));
        }

        let ttl = self.ttls.user_token_ttl;
        let mut claims =
            AccessTokenClaims::for_subject(&record.subject).with_client(&client.client_id);
        let user = self.find_subject_user(&record.subject).await?;
        if let Some(user) = &user {
            claims = claims
                .with_user(user.user_id.to_string(), &user.username)
                .with_roles(self.directory.role_names(user).await?);
        }
        let access_token = self.jwt.issue(claims.with_scopes(effective.clone()), ttl)?;

        // The successor keeps the chain's full scope set; narrowing only
        // affects the access token it rides along with.
        let refresh_value = self
            .mint_refresh_chain_link(&record, &client)
            .await?;

        tracing::info!(
            subject = %record.subject,
            client_id = %client.client_id,
            rotated_from = %record.token_id,
            "Rotated refresh token"
        );
        Ok(
            TokenResponse::new(access_token, ttl.as_secs(), scope::join(&effective))
                .with_refresh_token(refresh_value),
        )
    }

    // ------------------------------------------------------------------
    // token_exchange
    // ------------------------------------------------------------------

    async fn token_exchange(
        &self,
        request: &TokenRequest,
        client_id: &str,
    ) -> AuthResult<TokenResponse> {
        let client = self
            .authenticate(client_id, request.client_secret.as_deref(), GrantType::TokenExchange)
            .await?;

        let Some(subject_token) = request.subject_token.as_deref() else {
            return Err(AuthError::invalid_request("subject_token is required"));
        };
        if let Some(token_type) = request.subject_token_type.as_deref()
            && !SUBJECT_TOKEN_TYPES.contains(&token_type)
        {
            return Err(AuthError::invalid_request(format!(
                "unsupported subject_token_type '{token_type}'"
            )));
        }

        let subject = self
            .jwt
            .verify(subject_token)
            .map_err(|e| AuthError::invalid_grant(format!("subject token rejected: {e}")))?;

        let requested = scope::split(request.scope.as_deref().unwrap_or_default());
        let effective = if requested.is_empty() {
            subject.scopes.clone()
        } else {
            let missing = scope::missing(&subject.scopes, &requested);
            if !missing.is_empty() {
                return Err(AuthError::invalid_scope(format!(
                    "requested scopes exceed the subject token: {}",
                    missing.join(" ")
                )));
            }
            requested
        };

        let ttl = if subject.user_id.is_some() {
            self.ttls.user_token_ttl
        } else {
            self.ttls.service_token_ttl
        };

        let mut claims = AccessTokenClaims::for_subject(&subject.sub)
            .with_client(&client.client_id)
            .with_scopes(effective.clone());
        claims.user_id = subject.user_id.clone();
        claims.username = subject.username.clone();
        claims.upn = subject.upn.clone();
        claims.roles = subject.roles.clone();
        let access_token = self.jwt.issue(claims, ttl)?;

        tracing::info!(subject = %subject.sub, client_id = %client.client_id, "Exchanged subject token");
        Ok(TokenResponse::new(
            access_token,
            ttl.as_secs(),
            scope::join(&effective),
        ))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn authenticate(
        &self,
        client_id: &str,
        secret: Option<&str>,
        grant: GrantType,
    ) -> AuthResult<ServiceClient> {
        let client = self.directory.authenticate_client(client_id, secret).await?;
        if !client.is_grant_allowed(grant) {
            return Err(AuthError::unauthorized_client(format!(
                "client '{client_id}' may not use the {grant} grant"
            )));
        }
        Ok(client)
    }

    async fn find_subject_user(&self, subject: &str) -> AuthResult<Option<User>> {
        let Ok(user_id) = Uuid::parse_str(subject) else {
            return Ok(None);
        };
        self.directory.find_user(user_id).await
    }

    async fn mint_refresh_token(
        &self,
        user: &User,
        client: &ServiceClient,
        scopes: &[String],
        rotated_from: Option<Uuid>,
    ) -> AuthResult<String> {
        let now = self.clock.now();
        let value = RefreshToken::generate_value();
        let record = RefreshToken {
            token_id: Uuid::new_v4(),
            opaque_value_hash: RefreshToken::hash_value(&value),
            subject: user.user_id.to_string(),
            client_id: client.client_id.clone(),
            scopes: scopes.to_vec(),
            issued_at: now,
            expires_at: now + self.refresh_ttl(),
            revoked_at: None,
            rotated_from,
        };
        self.refresh_tokens.create(&record).await?;
        Ok(value)
    }

    async fn mint_refresh_chain_link(
        &self,
        predecessor: &RefreshToken,
        client: &ServiceClient,
    ) -> AuthResult<String> {
        let now = self.clock.now();
        let value = RefreshToken::generate_value();
        let record = RefreshToken {
            token_id: Uuid::new_v4(),
            opaque_value_hash: RefreshToken::hash_value(&value),
            subject: predecessor.subject.clone(),
            client_id: client.client_id.clone(),
            scopes: predecessor.scopes.clone(),
            issued_at: now,
            expires_at: now + self.refresh_ttl(),
            revoked_at: None,
            rotated_from: Some(predecessor.token_id),
        };
        self.refresh_tokens.create(&record).await?;
        Ok(value)
    }

    fn refresh_ttl(&self) -> time::Duration {
        time::Duration::try_from(self.ttls.refresh_token_ttl)
            .unwrap_or_else(|_| time::Duration::days(30))
    }

    /// Revokes every token in the rotation chain `member` belongs to.
    async fn revoke_chain(&self, member: &RefreshToken) -> AuthResult<()> {
        let now = self.clock.now();

        let mut root = member.clone();
        while let Some(parent_id) = root.rotated_from {
            match self.refresh_tokens.find_by_id(parent_id).await? {
                Some(parent) => root = parent,
                None => break,
            }
        }

        let mut revoked = 0u32;
        let mut current = Some(root);
        while let Some(token) = current {
            if self.refresh_tokens.revoke(token.token_id, now).await? {
                revoked += 1;
            }
            current = self.refresh_tokens.find_successor(token.token_id).await?;
        }

        tracing::warn!(
            subject = %member.subject,
            client_id = %member.client_id,
            revoked,
            "Refresh token reuse, revoked rotation chain"
        );
        Ok(())
    }

    fn rate_limited(&self, key: &str) -> AuthError {
        AuthError::RateLimited {
            retry_after_seconds: self.rate_limiter.retry_after(key).as_secs(),
        }
    }

    async fn delay_failure(&self) {
        if self.failure_delay.is_zero() {
            return;
        }
        let jitter = rand::thread_rng().gen_range(0..=FAILURE_JITTER_MS);
        tokio::time::sleep(self.failure_delay + Duration::from_millis(jitter)).await;
    }
}

fn effective_client_scopes(
    client: &ServiceClient,
    requested: &[String],
) -> AuthResult<Vec<String>> {
    if requested.is_empty() {
        return Ok(client.allowed_scopes.clone());
    }
    let disallowed = client.disallowed_scopes(requested);
    if !disallowed.is_empty() {
        return Err(AuthError::invalid_scope(format!(
            "scopes not allowed for this client: {}",
            disallowed.join(" ")
        )));
    }
    Ok(requested.to_vec())
}
