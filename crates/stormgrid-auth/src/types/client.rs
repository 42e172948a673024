//! Service client type and grant classification.

use serde::{Deserialize, Serialize};

use crate::scope;

/// OAuth 2.0 grant types this server dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Machine-to-machine authentication with client credentials.
    ClientCredentials,
    /// Resource-owner password credentials (first-party clients only).
    Password,
    /// Refresh-token rotation.
    RefreshToken,
    /// RFC 8693-style exchange of a subject token for a session token.
    TokenExchange,
}

impl GrantType {
    /// Parses the wire form of a grant type.
    ///
    /// Accepts the RFC 8693 urn alongside the short `token_exchange` form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client_credentials" => Some(Self::ClientCredentials),
            "password" => Some(Self::Password),
            "refresh_token" => Some(Self::RefreshToken),
            "token_exchange" | "urn:ietf:params:oauth:grant-type:token-exchange" => {
                Some(Self::TokenExchange)
            }
            _ => None,
        }
    }

    /// Returns the canonical wire form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
            Self::TokenExchange => "token_exchange",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a client can keep a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    /// Server-side client holding a hashed secret.
    Confidential,
    /// Client that cannot hold a secret (browser, game client).
    Public,
}

/// A registered service client.
///
/// Confidential clients must carry a secret hash; public clients carry none
/// and are never allowed the password grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceClient {
    /// Unique client id chosen at registration.
    pub client_id: String,

    /// Confidential or public.
    pub kind: ClientKind,

    /// Argon2 hash of the client secret (confidential clients only).
    #[serde(default, skip_serializing)]
    pub secret_hash: Option<String>,

    /// Display name for admin surfaces.
    pub display_name: String,

    /// Scope expressions this client may be granted.
    pub allowed_scopes: Vec<String>,

    /// Grant types this client may use.
    pub allowed_grants: Vec<GrantType>,

    /// Disabled clients fail authentication.
    pub enabled: bool,
}

impl ServiceClient {
    /// Returns `true` if the grant type is in `allowed_grants`.
    ///
    /// The password grant is categorically denied to public clients,
    /// whatever the configuration says.
    #[must_use]
    pub fn is_grant_allowed(&self, grant: GrantType) -> bool {
        if grant == GrantType::Password && self.kind == ClientKind::Public {
            return false;
        }
        self.allowed_grants.contains(&grant)
    }

    /// Returns `true` if every requested scope is covered by this client's
    /// allowed scope expressions.
    #[must_use]
    pub fn allows_scopes(&self, requested: &[String]) -> bool {
        scope::has_all(&self.allowed_scopes, requested)
    }

    /// The requested scopes this client does not allow.
    #[must_use]
    pub fn disallowed_scopes(&self, requested: &[String]) -> Vec<String> {
        scope::missing(&self.allowed_scopes, requested)
    }
}
