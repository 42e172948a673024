//! Application state wiring.
//!
//! One `AppState` is built at startup from the merged configuration. All
//! singletons (clock, broker, broadcaster) are explicit dependencies
//! constructed here and injected; tests build the same state with a
//! manual clock.

use std::sync::Arc;

use anyhow::Context;
use stormgrid_auth::broker::AuthBroker;
use stormgrid_auth::directory::Directory;
use stormgrid_auth::match_token::MatchTokenService;
use stormgrid_auth::middleware::{ApiTokenExchanger, AuthLayerState};
use stormgrid_auth::oauth::TokenService;
use stormgrid_auth::password::PasswordHasher;
use stormgrid_auth::policy::{AccessRule, PolicyTable, ScopePolicy};
use stormgrid_auth::rate_limit::RateLimiter;
use stormgrid_auth::storage::memory::{
    InMemoryClientStore, InMemoryMatchTokenStore, InMemoryRefreshTokenStore, InMemoryRoleStore,
    InMemoryUserStore,
};
use stormgrid_auth::token::jwt::{JwtService, generate_rsa_keys_pem};
use stormgrid_auth::types::Role;
use stormgrid_cluster::{Autoscaler, NodeRegistry, Scheduler};
use stormgrid_config::ServerConfig;
use stormgrid_core::{Clock, ErrorBroadcaster, SystemClock};

use axum::http::Method;

/// Client id the API-token exchange hook acts as.
const INTERNAL_CLIENT_ID: &str = "control-plane";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Merged configuration.
    pub config: Arc<ServerConfig>,

    /// Identity directory (users, roles, clients).
    pub directory: Arc<Directory>,

    /// OAuth 2.0 grant dispatcher.
    pub token_service: Arc<TokenService>,

    /// Match token issuance and validation.
    pub match_tokens: Arc<MatchTokenService>,

    /// Node fleet inventory.
    pub registry: Arc<NodeRegistry>,

    /// Match placement.
    pub scheduler: Arc<Scheduler>,

    /// Scale recommendations.
    pub autoscaler: Arc<Autoscaler>,

    /// WebSocket auth handoff store.
    pub broker: Arc<AuthBroker>,

    /// Token-endpoint rate limiter.
    pub rate_limiter: Arc<RateLimiter>,

    /// Error-event fan-out.
    pub errors: ErrorBroadcaster,

    /// State for the authorization middleware.
    pub auth_layer: AuthLayerState,
}

impl AppState {
    /// Builds the full state graph from configuration with the system
    /// clock.
    ///
    /// # Errors
    ///
    /// Fails on invalid signing material or unseedable clients/users.
    pub async fn from_config(config: ServerConfig) -> anyhow::Result<Self> {
        Self::from_config_with_clock(config, SystemClock::shared()).await
    }

    /// Builds the state graph with an injected clock (tests).
    ///
    /// # Errors
    ///
    /// Fails on invalid signing material or unseedable clients/users.
    pub async fn from_config_with_clock(
        config: ServerConfig,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let hasher = PasswordHasher::new(config.auth.password_hash);

        let directory = Arc::new(Directory::new(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemoryRoleStore::new()),
            Arc::new(InMemoryClientStore::new()),
            hasher,
        ));
        seed_directory(&directory, &config).await?;

        let jwt = Arc::new(build_jwt_service(&config, Arc::clone(&clock))?);
        let rate_limiter = Arc::new(RateLimiter::new(
            config.auth.rate_limit.clone(),
            Arc::clone(&clock),
        ));
        let token_service = Arc::new(TokenService::new(
            Arc::clone(&directory),
            Arc::new(InMemoryRefreshTokenStore::new()),
            Arc::clone(&jwt),
            Arc::clone(&rate_limiter),
            Arc::clone(&clock),
            config.auth.tokens.clone(),
        ));
        let match_tokens = Arc::new(MatchTokenService::new(
            Arc::new(InMemoryMatchTokenStore::new()),
            Arc::clone(&jwt),
            Arc::clone(&clock),
            config.auth.tokens.match_token_ttl,
        ));

        let registry = Arc::new(NodeRegistry::new(
            config.registry.clone(),
            Arc::clone(&clock),
        ));
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&registry)));
        let autoscaler = Arc::new(Autoscaler::new(
            Arc::clone(&registry),
            config.autoscaler.clone(),
            Arc::clone(&clock),
        ));

        let broker = Arc::new(AuthBroker::new(
            Arc::clone(&clock),
            config.registry.sweep_interval,
        ));
        let exchanger = Arc::new(ApiTokenExchanger::new(
            Arc::clone(&token_service),
            INTERNAL_CLIENT_ID,
            Arc::clone(&clock),
        ));

        let auth_layer = AuthLayerState {
            jwt,
            policy: Arc::new(control_plane_policy()),
            exchanger: Some(exchanger),
        };

        Ok(Self {
            config,
            directory,
            token_service,
            match_tokens,
            registry,
            scheduler,
            autoscaler,
            broker,
            rate_limiter,
            errors: ErrorBroadcaster::new(),
            auth_layer,
        })
    }
}

/// The endpoint policy table for the control-plane API surface.
///
/// Unlisted routes (token endpoint, validation, health, the WebSocket
/// upgrade) are anonymous at this layer; the WebSocket path authenticates
/// through the broker instead.
fn control_plane_policy() -> PolicyTable {
    PolicyTable::new(AccessRule::Anonymous)
        .protect(
            Method::POST,
            "/api/nodes",
            ScopePolicy::require("control-plane.node.register"),
        )
        .protect(
            Method::PUT,
            "/api/nodes/{id}/heartbeat",
            ScopePolicy::require("control-plane.node.register"),
        )
        .protect(
            Method::POST,
            "/api/nodes/{id}/drain",
            ScopePolicy::require("control-plane.node.manage"),
        )
        .protect(
            Method::DELETE,
            "/api/nodes/{id}",
            ScopePolicy::require("control-plane.node.manage"),
        )
        .protect(
            Method::GET,
            "/api/nodes",
            ScopePolicy::require("control-plane.cluster.read"),
        )
        .protect(
            Method::GET,
            "/api/autoscaler/recommendation",
            ScopePolicy::require("control-plane.autoscaler.read"),
        )
        .protect(
            Method::POST,
            "/api/autoscaler/ack",
            ScopePolicy::require("control-plane.autoscaler.manage"),
        )
}

fn build_jwt_service(config: &ServerConfig, clock: Arc<dyn Clock>) -> anyhow::Result<JwtService> {
    let signing = &config.auth.signing;
    let issuer = config.auth.issuer.clone();

    let mut service = if signing.has_rsa_pair() {
        let private = signing.rsa_private_key_pem.as_deref().unwrap_or_default();
        let public = signing.rsa_public_key_pem.as_deref().unwrap_or_default();
        JwtService::rs256_from_pem(private.as_bytes(), public.as_bytes(), issuer, clock)
            .context("configured RSA key pair rejected")?
    } else if let Some(secret) = &signing.hmac_secret {
        JwtService::hs256(secret.as_bytes(), issuer, clock)
            .context("configured HS256 secret rejected")?
    } else {
        // No key material configured: generate an ephemeral pair. Tokens
        // do not survive a restart.
        tracing::warn!("No signing material configured, generating ephemeral RSA keys");
        let (private, public) = generate_rsa_keys_pem().context("RSA key generation failed")?;
        JwtService::rs256_from_pem(private.as_bytes(), public.as_bytes(), issuer, clock)
            .context("generated RSA key pair rejected")?
    };

    if let Some(audience) = &signing.audience {
        service = service.with_audience(audience);
    }
    Ok(service)
}

async fn seed_directory(directory: &Directory, config: &ServerConfig) -> anyhow::Result<()> {
    for seed in &config.auth.clients {
        directory
            .register_client(
                &seed.client_id,
                seed.kind,
                seed.secret.as_deref(),
                seed.display_name.clone().unwrap_or_else(|| seed.client_id.clone()),
                seed.allowed_scopes.clone(),
                seed.allowed_grants.clone(),
                seed.enabled,
            )
            .await
            .with_context(|| format!("failed to seed client '{}'", seed.client_id))?;
    }

    // The internal client the API-token exchange hook authenticates as.
    if directory.find_client(INTERNAL_CLIENT_ID).await?.is_none() {
        directory
            .register_client(
                INTERNAL_CLIENT_ID,
                stormgrid_auth::types::ClientKind::Public,
                None,
                "Control plane internal",
                vec!["*".to_string()],
                vec![stormgrid_auth::types::GrantType::TokenExchange],
                true,
            )
            .await
            .context("failed to seed internal client")?;
    }

    // Roles first (in dependency order), then users.
    let mut remaining: Vec<_> = config.auth.roles.iter().collect();
    while !remaining.is_empty() {
        let mut progressed = false;
        let mut deferred = Vec::new();
        for seed in remaining {
            let mut included = Vec::with_capacity(seed.includes.len());
            let mut ready = true;
            for name in &seed.includes {
                match directory.find_role_by_name(name).await? {
                    Some(role) => included.push(role.role_id),
                    None => {
                        ready = false;
                        break;
                    }
                }
            }
            if !ready {
                deferred.push(seed);
                continue;
            }
            let mut role = Role::new(&seed.name, seed.scopes.clone());
            role.included_role_ids = included;
            directory
                .save_role(&role)
                .await
                .with_context(|| format!("failed to seed role '{}'", seed.name))?;
            progressed = true;
        }
        if !progressed && !deferred.is_empty() {
            anyhow::bail!("role seeds contain an inheritance cycle");
        }
        remaining = deferred;
    }

    for seed in &config.auth.users {
        let mut role_ids = Vec::with_capacity(seed.roles.len());
        for name in &seed.roles {
            let role = directory
                .find_role_by_name(name)
                .await?
                .with_context(|| format!("user '{}' references unknown role '{name}'", seed.username))?;
            role_ids.push(role.role_id);
        }
        directory
            .create_user(&seed.username, &seed.password, role_ids)
            .await
            .with_context(|| format!("failed to seed user '{}'", seed.username))?;
    }

    Ok(())
}
