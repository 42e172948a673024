//! Token endpoint wire types.
//!
//! One request structure covers every grant type; which fields are
//! required depends on `grant_type`. Unknown form parameters are ignored
//! by serde, per RFC 6749.

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Token request parameters.
///
/// Field requirements per grant:
///
/// - `client_credentials`: client_id, client_secret, (optional) scope
/// - `password`: + username, password
/// - `refresh_token`: refresh_token, (optional) scope
/// - `token_exchange`: subject_token, (optional) subject_token_type, scope
///
/// Clients authenticate with HTTP Basic or `client_id`/`client_secret` in
/// the body; the port layer folds Basic credentials into this structure
/// before dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// OAuth 2.0 grant type.
    pub grant_type: String,

    /// Client id (body authentication or public clients).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (body authentication).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Requested scope, space-delimited. Empty means "everything I'm
    /// allowed".
    #[serde(default)]
    pub scope: Option<String>,

    /// Username (password grant).
    #[serde(default)]
    pub username: Option<String>,

    /// Password (password grant).
    #[serde(default)]
    pub password: Option<String>,

    /// Refresh token (refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Subject token (token exchange).
    #[serde(default)]
    pub subject_token: Option<String>,

    /// Subject token type (token exchange).
    #[serde(default)]
    pub subject_token_type: Option<String>,
}

impl TokenRequest {
    /// Starts a request for the given grant type; used by tests and
    /// internal exchanges.
    #[must_use]
    pub fn for_grant(grant_type: impl Into<String>) -> Self {
        Self {
            grant_type: grant_type.into(),
            client_id: None,
            client_secret: None,
            scope: None,
            username: None,
            password: None,
            refresh_token: None,
            subject_token: None,
            subject_token_type: None,
        }
    }

    /// Sets body client credentials.
    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>, secret: Option<&str>) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = secret.map(ToString::to_string);
        self
    }

    /// Sets the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Successful token response.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 900,
///   "scope": "engine.match.read",
///   "refresh_token": "pXx4..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token (JWT).
    pub access_token: String,

    /// Token type, always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Refresh token (password and refresh_token grants only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Creates a response without a refresh token.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
        }
    }

    /// Attaches a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

/// RFC 6749 §5.2 error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthErrorBody {
    /// OAuth 2.0 error code.
    pub error: String,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&AuthError> for OAuthErrorBody {
    fn from(err: &AuthError) -> Self {
        Self {
            error: err.oauth_error_code().to_string(),
            error_description: Some(err.to_string()),
        }
    }
}
