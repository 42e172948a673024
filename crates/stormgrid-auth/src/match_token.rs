//! Per-player match capability tokens.
//!
//! A match token lets one player act inside one specific match (and, when
//! container-scoped, only through that container). Tokens are short-lived
//! and individually revocable; the JWT half carries the match claims for
//! stateless consumers while `validate_for` consults the stored record.

use std::sync::Arc;
use std::time::Duration;

use stormgrid_core::Clock;
use uuid::Uuid;

use crate::error::AuthResult;
use crate::scope;
use crate::storage::MatchTokenStore;
use crate::token::jwt::{AccessTokenClaims, JwtService};
use crate::types::MatchToken;

/// Parameters for issuing a match token.
#[derive(Debug, Clone)]
pub struct MatchTokenSpec {
    /// Match the token grants access to.
    pub match_id: String,
    /// Container hosting the match; set to scope the token to it.
    pub container_id: Option<String>,
    /// Player slot inside the match.
    pub player_id: u64,
    /// Platform account behind the player, when known.
    pub user_id: Option<Uuid>,
    /// Display name of the player.
    pub player_name: String,
    /// Scopes the token carries.
    pub scopes: Vec<String>,
    /// Overrides the configured TTL when set.
    pub ttl: Option<Duration>,
}

/// An issued match token: the stored record plus the signed JWT.
#[derive(Debug, Clone)]
pub struct IssuedMatchToken {
    /// The revocable server-side record.
    pub token: MatchToken,
    /// The compact JWT handed to the player.
    pub jwt: String,
}

/// Issues, revokes, and validates match tokens.
pub struct MatchTokenService {
    store: Arc<dyn MatchTokenStore>,
    jwt: Arc<JwtService>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl MatchTokenService {
    /// Creates a match token service with the configured default TTL.
    #[must_use]
    pub fn new(
        store: Arc<dyn MatchTokenStore>,
        jwt: Arc<JwtService>,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            store,
            jwt,
            clock,
            default_ttl,
        }
    }

    /// Issues a token for one player in one match.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the record cannot be persisted, `Internal` if
    /// signing fails.
    pub async fn issue(&self, spec: MatchTokenSpec) -> AuthResult<IssuedMatchToken> {
        let now = self.clock.now();
        let ttl = spec.ttl.unwrap_or(self.default_ttl);
        let token = MatchToken {
            id: Uuid::new_v4(),
            match_id: spec.match_id,
            container_id: spec.container_id,
            player_id: spec.player_id,
            user_id: spec.user_id,
            player_name: spec.player_name,
            scopes: spec.scopes,
            created_at: now,
            expires_at: now
                + time::Duration::try_from(ttl).unwrap_or_else(|_| time::Duration::hours(2)),
            revoked_at: None,
        };
        self.store.create(&token).await?;

        let subject = token
            .user_id
            .map_or_else(|| token.player_name.clone(), |id| id.to_string());
        let mut claims = AccessTokenClaims::for_subject(subject)
            .with_scopes(token.scopes.clone());
        claims.user_id = token.user_id.map(|id| id.to_string());
        claims.match_id = Some(token.match_id.clone());
        claims.container_id = token.container_id.clone();
        claims.player_id = Some(token.player_id);
        claims.player_name = Some(token.player_name.clone());
        claims.match_token_id = Some(token.id.to_string());
        let jwt = self.jwt.issue(claims, ttl)?;

        tracing::info!(
            match_id = %token.match_id,
            player_id = token.player_id,
            token_id = %token.id,
            "Issued match token"
        );
        Ok(IssuedMatchToken { token, jwt })
    }

    /// Revokes a match token. Returns `true` iff it transitioned.
    pub async fn revoke(&self, token_id: Uuid) -> AuthResult<bool> {
        let revoked = self.store.revoke(token_id, self.clock.now()).await?;
        if revoked {
            tracing::info!(token_id = %token_id, "Revoked match token");
        }
        Ok(revoked)
    }

    /// Returns `true` if the player holds an active token for the target
    /// match (and container, when the token is container-scoped) carrying
    /// the required scope.
    pub async fn validate_for(
        &self,
        match_id: &str,
        container_id: Option<&str>,
        player_id: u64,
        required_scope: &str,
    ) -> AuthResult<bool> {
        let now = self.clock.now();
        let tokens = self.store.find_for_player(match_id, player_id).await?;
        Ok(tokens.iter().any(|token| {
            token.is_active(now)
                && token
                    .container_id
                    .as_deref()
                    .is_none_or(|scoped| container_id == Some(scoped))
                && scope::covered(&token.scopes, required_scope)
        }))
    }

    /// Removes expired records. Returns the number removed.
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        self.store.cleanup_expired(self.clock.now()).await
    }
}
