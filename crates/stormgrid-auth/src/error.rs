//! Authentication and authorization error types.
//!
//! Grant handlers and the authorization middleware return tagged variants;
//! the port layer maps each variant to an HTTP status and, where one exists,
//! an RFC 6749 error code.

use std::fmt;

/// Result alias used throughout the auth crate.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is malformed or missing a required parameter.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// Client authentication failed.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The grant (credentials, refresh token, subject token) is invalid,
    /// expired, or revoked.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The authenticated client may not use this grant type.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of why the client is not authorized.
        message: String,
    },

    /// The grant type is not supported by this server.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The requested scope exceeds what the caller is allowed.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// No client is registered under the presented id.
    #[error("Client not found: {client_id}")]
    ClientNotFound {
        /// The unknown client id.
        client_id: String,
    },

    /// The client exists but has been disabled.
    #[error("Client disabled: {client_id}")]
    ClientDisabled {
        /// The disabled client id.
        client_id: String,
    },

    /// The caller exceeded its request budget.
    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds until the current window resets.
        retry_after_seconds: u64,
    },

    /// The token's expiry is in the past.
    #[error("Token expired")]
    TokenExpired,

    /// The token has been explicitly revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// The token signature does not verify.
    #[error("Token signature invalid")]
    TokenSignatureInvalid,

    /// The request lacks valid authentication credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// Authenticated, but missing one or more required scopes.
    #[error("Forbidden, missing scopes: {}", missing.join(" "))]
    Forbidden {
        /// The scopes the caller would need.
        missing: Vec<String>,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `ClientNotFound` error.
    #[must_use]
    pub fn client_not_found(client_id: impl Into<String>) -> Self {
        Self::ClientNotFound {
            client_id: client_id.into(),
        }
    }

    /// Creates a new `ClientDisabled` error.
    #[must_use]
    pub fn client_disabled(client_id: impl Into<String>) -> Self {
        Self::ClientDisabled {
            client_id: client_id.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error listing the missing scopes.
    #[must_use]
    pub fn forbidden(missing: Vec<String>) -> Self {
        Self::Forbidden { missing }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is an authentication failure that should be
    /// flattened with the constant response delay.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidClient { .. }
                | Self::InvalidGrant { .. }
                | Self::ClientNotFound { .. }
                | Self::ClientDisabled { .. }
                | Self::Unauthorized { .. }
                | Self::TokenExpired
                | Self::TokenRevoked
                | Self::TokenSignatureInvalid
        )
    }

    /// Returns the RFC 6749 error code for this error.
    ///
    /// Internal kinds that RFC 6749 has no word for collapse onto the
    /// nearest public code so clients never learn whether a client id
    /// exists or is merely disabled.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } | Self::ClientNotFound { .. } | Self::ClientDisabled { .. } => {
                "invalid_client"
            }
            Self::InvalidGrant { .. }
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::TokenSignatureInvalid => "invalid_grant",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::RateLimited { .. } => "rate_limit_exceeded",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "access_denied",
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "server_error"
            }
        }
    }

    /// Returns the HTTP status code the port layer should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient { .. }
            | Self::ClientNotFound { .. }
            | Self::ClientDisabled { .. }
            | Self::Unauthorized { .. }
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::TokenSignatureInvalid => 401,
            Self::Forbidden { .. } => 403,
            Self::RateLimited { .. } => 429,
            Self::Storage { .. } | Self::Internal { .. } | Self::Configuration { .. } => 503,
            Self::InvalidRequest { .. }
            | Self::InvalidGrant { .. }
            | Self::UnauthorizedClient { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::InvalidScope { .. } => 400,
        }
    }

    /// Returns the internal error tag used in logs and structured bodies.
    #[must_use]
    pub fn kind(&self) -> ErrorTag {
        match self {
            Self::InvalidRequest { .. } => ErrorTag::InvalidRequest,
            Self::InvalidClient { .. } => ErrorTag::InvalidClient,
            Self::InvalidGrant { .. } => ErrorTag::InvalidGrant,
            Self::UnauthorizedClient { .. } => ErrorTag::UnauthorizedClient,
            Self::UnsupportedGrantType { .. } => ErrorTag::UnsupportedGrantType,
            Self::InvalidScope { .. } => ErrorTag::InvalidScope,
            Self::ClientNotFound { .. } => ErrorTag::ClientNotFound,
            Self::ClientDisabled { .. } => ErrorTag::ClientDisabled,
            Self::RateLimited { .. } => ErrorTag::RateLimited,
            Self::TokenExpired => ErrorTag::TokenExpired,
            Self::TokenRevoked => ErrorTag::TokenRevoked,
            Self::TokenSignatureInvalid => ErrorTag::TokenSignatureInvalid,
            Self::Unauthorized { .. } => ErrorTag::Unauthorized,
            Self::Forbidden { .. } => ErrorTag::Forbidden,
            Self::Storage { .. } => ErrorTag::Storage,
            Self::Configuration { .. } => ErrorTag::Configuration,
            Self::Internal { .. } => ErrorTag::Internal,
        }
    }
}

/// Stable tags for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorTag {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    InvalidScope,
    ClientNotFound,
    ClientDisabled,
    RateLimited,
    TokenExpired,
    TokenRevoked,
    TokenSignatureInvalid,
    Unauthorized,
    Forbidden,
    Storage,
    Configuration,
    Internal,
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidClient => "INVALID_CLIENT",
            Self::InvalidGrant => "INVALID_GRANT",
            Self::UnauthorizedClient => "UNAUTHORIZED_CLIENT",
            Self::UnsupportedGrantType => "UNSUPPORTED_GRANT_TYPE",
            Self::InvalidScope => "INVALID_SCOPE",
            Self::ClientNotFound => "CLIENT_NOT_FOUND",
            Self::ClientDisabled => "CLIENT_DISABLED",
            Self::RateLimited => "RATE_LIMITED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::TokenSignatureInvalid => "TOKEN_SIGNATURE_INVALID",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::Storage => "STORAGE",
            Self::Configuration => "CONFIGURATION",
            Self::Internal => "INTERNAL",
        };
        write!(f, "{tag}")
    }
}
