//! API-token exchange with a bounded session cache.
//!
//! Requests carrying an `X-Api-Token` header (and no `Authorization`) get
//! their token exchanged for a session JWT through the token service. The
//! result is cached keyed by the API token's hash, with the cache entry
//! living exactly as long as the exchanged session token, so repeat callers
//! skip the exchange entirely.

use std::sync::Arc;

use dashmap::DashMap;
use stormgrid_core::Clock;
use time::OffsetDateTime;

use crate::error::AuthResult;
use crate::oauth::request::TokenRequest;
use crate::oauth::service::TokenService;

/// Default maximum number of cached sessions.
const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct CachedSession {
    jwt: String,
    expires_at: OffsetDateTime,
    last_used: OffsetDateTime,
}

/// Exchanges API tokens for session JWTs, caching the results.
pub struct ApiTokenExchanger {
    service: Arc<TokenService>,
    client_id: String,
    cache: DashMap<String, CachedSession>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl ApiTokenExchanger {
    /// Creates an exchanger acting as `client_id` (a registered client
    /// allowed the token-exchange grant).
    #[must_use]
    pub fn new(service: Arc<TokenService>, client_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service,
            client_id: client_id.into(),
            cache: DashMap::new(),
            capacity: DEFAULT_CACHE_CAPACITY,
            clock,
        }
    }

    /// Overrides the cache capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Returns a session JWT for the API token, from cache when possible.
    ///
    /// # Errors
    ///
    /// Propagates the token service's grant errors (`invalid_grant` for a
    /// rejected API token in particular).
    pub async fn exchange(&self, api_token: &str, client_ip: &str) -> AuthResult<String> {
        let key = cache_key(api_token);
        let now = self.clock.now();

        if let Some(mut hit) = self.cache.get_mut(&key) {
            if hit.expires_at > now {
                hit.last_used = now;
                return Ok(hit.jwt.clone());
            }
        }
        self.cache.remove(&key);

        let mut request = TokenRequest::for_grant("token_exchange");
        request.client_id = Some(self.client_id.clone());
        request.subject_token = Some(api_token.to_string());
        let response = self.service.grant(request, client_ip).await?;

        // Cache for exactly the session token's remaining lifetime.
        let expires_at = now + time::Duration::seconds(
            i64::try_from(response.expires_in).unwrap_or(i64::MAX),
        );
        self.insert_bounded(
            key,
            CachedSession {
                jwt: response.access_token.clone(),
                expires_at,
                last_used: now,
            },
        );
        Ok(response.access_token)
    }

    /// Number of cached sessions.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn insert_bounded(&self, key: String, session: CachedSession) {
        self.cache.insert(key, session);
        while self.cache.len() > self.capacity {
            // Evict the least recently used entry.
            let Some(oldest) = self
                .cache
                .iter()
                .min_by_key(|e| e.last_used)
                .map(|e| e.key().clone())
            else {
                break;
            };
            self.cache.remove(&oldest);
        }
    }
}

fn cache_key(api_token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(api_token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenTtlConfig;
    use crate::directory::Directory;
    use crate::password::PasswordHasher;
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::storage::memory::{
        InMemoryClientStore, InMemoryRefreshTokenStore, InMemoryRoleStore, InMemoryUserStore,
    };
    use crate::token::jwt::{AccessTokenClaims, JwtService};
    use crate::types::{ClientKind, GrantType};
    use std::time::Duration;
    use stormgrid_core::ManualClock;

    async fn exchanger(clock: Arc<ManualClock>) -> (Arc<JwtService>, ApiTokenExchanger) {
        let directory = Arc::new(Directory::new(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemoryRoleStore::new()),
            Arc::new(InMemoryClientStore::new()),
            PasswordHasher::default(),
        ));
        directory
            .register_client(
                "control-plane",
                ClientKind::Public,
                None,
                "Control plane",
                vec!["*".to_string()],
                vec![GrantType::TokenExchange],
                true,
            )
            .await
            .unwrap();

        let jwt = Arc::new(
            JwtService::hs256(
                b"0123456789abcdef0123456789abcdef",
                "https://control.test",
                clock.clone(),
            )
            .unwrap(),
        );
        let service = Arc::new(
            TokenService::new(
                directory,
                Arc::new(InMemoryRefreshTokenStore::new()),
                jwt.clone(),
                Arc::new(RateLimiter::new(RateLimitConfig::default(), clock.clone())),
                clock.clone(),
                TokenTtlConfig::default(),
            )
            .with_failure_delay(Duration::ZERO),
        );
        (
            jwt,
            ApiTokenExchanger::new(service, "control-plane", clock).with_capacity(2),
        )
    }

    fn api_token(jwt: &JwtService) -> String {
        jwt.issue(
            AccessTokenClaims::for_subject("svc-bot")
                .with_scopes(vec!["engine.match.read".to_string()]),
            Duration::from_secs(3600),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_exchange_and_cache_hit() {
        let clock = Arc::new(ManualClock::epoch());
        let (jwt, exchanger) = exchanger(clock.clone()).await;
        let token = api_token(&jwt);

        let first = exchanger.exchange(&token, "ip").await.unwrap();
        let second = exchanger.exchange(&token, "ip").await.unwrap();
        assert_eq!(first, second, "cache hit returns the same session");
        assert_eq!(exchanger.cached(), 1);

        let claims = jwt.verify(&first).unwrap();
        assert_eq!(claims.scopes, vec!["engine.match.read"]);
        assert_eq!(claims.client_id.as_deref(), Some("control-plane"));
    }

    #[tokio::test]
    async fn test_cache_expires_with_session() {
        let clock = Arc::new(ManualClock::epoch());
        let (jwt, exchanger) = exchanger(clock.clone()).await;
        let token = api_token(&jwt);

        let first = exchanger.exchange(&token, "ip").await.unwrap();
        clock.advance(time::Duration::seconds(901));
        // Session (service ttl 900s) lapsed; a fresh exchange happens.
        let second = exchanger.exchange(&token, "ip").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_rejected_api_token() {
        let clock = Arc::new(ManualClock::epoch());
        let (_, exchanger) = exchanger(clock).await;
        let err = exchanger.exchange("garbage", "ip").await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
        assert_eq!(exchanger.cached(), 0);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let clock = Arc::new(ManualClock::epoch());
        let (jwt, exchanger) = exchanger(clock.clone()).await;

        let t1 = api_token(&jwt);
        clock.advance(time::Duration::seconds(1));
        let t2 = api_token(&jwt);
        clock.advance(time::Duration::seconds(1));
        let t3 = api_token(&jwt);

        exchanger.exchange(&t1, "ip").await.unwrap();
        clock.advance(time::Duration::seconds(1));
        exchanger.exchange(&t2, "ip").await.unwrap();
        clock.advance(time::Duration::seconds(1));
        // Touch t1 so t2 is the least recently used.
        exchanger.exchange(&t1, "ip").await.unwrap();
        clock.advance(time::Duration::seconds(1));
        exchanger.exchange(&t3, "ip").await.unwrap();

        assert_eq!(exchanger.cached(), 2, "capacity bound holds");
    }
}
