//! WebSocket authentication handoff.
//!
//! Authentication happens at HTTP-upgrade time, but the connection id only
//! exists after the upgrade completes. The broker bridges that gap: the
//! upgrade handler stores the auth result under a token-derived key, and
//! the connection handler claims it by re-deriving the key from the query
//! string, atomically rekeying the entry to the connection id.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use stormgrid_core::Clock;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How a connection authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// A user session token.
    User,
    /// A service client token.
    Client,
    /// A per-player match token.
    MatchToken,
    /// An exchanged API token.
    ApiToken,
    /// No credentials; allowed on anonymous-enabled paths only.
    Anonymous,
}

/// The auth result handed from the HTTP upgrade to the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthHandoff {
    /// Authenticated principal (user id, client id, or player identity).
    pub principal: String,

    /// How the principal authenticated.
    pub auth_type: AuthKind,

    /// Scopes the connection carries.
    pub scopes: Vec<String>,

    /// When the underlying credential expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Keyed store of pending and claimed auth handoffs.
pub struct AuthBroker {
    entries: DashMap<String, AuthHandoff>,
    clock: Arc<dyn Clock>,
    sweep_interval: Duration,
}

impl AuthBroker {
    /// Creates a broker sweeping expired entries at `sweep_interval`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, sweep_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            sweep_interval,
        }
    }

    /// Derives the storage key for a bearer-style token value.
    ///
    /// The raw token never becomes a map key; its hash does.
    #[must_use]
    pub fn token_key(token: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("token:{}", hex::encode(hasher.finalize()))
    }

    /// Derives the storage key for an anonymous path entry.
    #[must_use]
    pub fn anonymous_key(path: &str) -> String {
        format!("anon:{path}")
    }

    /// Stores a handoff under the given key, replacing any previous entry.
    pub fn store(&self, key: impl Into<String>, handoff: AuthHandoff) {
        self.entries.insert(key.into(), handoff);
    }

    /// Moves an entry to a new key. Returns `false` if the source is gone.
    pub fn transfer(&self, from_key: &str, to_key: impl Into<String>) -> bool {
        match self.entries.remove(from_key) {
            Some((_, handoff)) => {
                self.entries.insert(to_key.into(), handoff);
                true
            }
            None => false,
        }
    }

    /// Claims the handoff for a freshly opened connection.
    ///
    /// Tries, in order: a `match_token` query parameter, an access-`token`
    /// parameter, an `api_token` parameter, then an anonymous entry whose
    /// registered path is a prefix of `path`. A successful claim atomically
    /// rekeys the entry to `connection_id`; expired entries are discarded
    /// instead of claimed.
    pub fn claim_from_query(
        &self,
        query: &str,
        connection_id: &str,
        path: &str,
    ) -> Option<AuthHandoff> {
        for param in ["match_token", "token", "api_token"] {
            if let Some(value) = query_param(query, param)
                && let Some(handoff) = self.claim(&Self::token_key(value), connection_id)
            {
                return Some(handoff);
            }
        }
        self.claim_anonymous(path, connection_id)
    }

    fn claim(&self, key: &str, connection_id: &str) -> Option<AuthHandoff> {
        // `remove` is the atomic take; losers of a race get `None`.
        let (_, handoff) = self.entries.remove(key)?;
        if handoff.expires_at <= self.clock.now() {
            return None;
        }
        self.entries
            .insert(connection_id.to_string(), handoff.clone());
        Some(handoff)
    }

    fn claim_anonymous(&self, path: &str, connection_id: &str) -> Option<AuthHandoff> {
        let key = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with("anon:"))
            .find(|e| path.starts_with(&e.key()["anon:".len()..]))
            .map(|e| e.key().clone())?;
        self.claim(&key, connection_id)
    }

    /// Removes an entry (connection close, explicit logout).
    pub fn remove(&self, key: &str) -> Option<AuthHandoff> {
        self.entries.remove(key).map(|(_, handoff)| handoff)
    }

    /// Drops entries whose credential has expired. Returns the number
    /// removed.
    pub fn remove_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, handoff| handoff.expires_at > now);
        before - self.entries.len()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the broker holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawns the periodic expiry sweep; it exits when `shutdown` flips.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        let interval = broker.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        let removed = broker.remove_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired auth handoffs");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}
