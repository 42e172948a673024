//! JWT issuance and validation.
//!
//! Tokens are compact JWS. RS256 is used when a PEM key pair is configured;
//! deployments without one fall back to HS256 with a shared secret. Access
//! tokens are stateless: validation is signature + clock + issuer, and
//! revocation is handled by keeping lifetimes short.
//!
//! Expiry is checked against the injected [`Clock`] rather than the process
//! clock, which keeps token-lifetime tests deterministic.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use stormgrid_core::Clock;

use crate::error::{AuthError, AuthResult};

/// Claims carried by every Stormgrid-issued JWT.
///
/// Match tokens reuse the same structure with the match-specific fields
/// populated; plain access tokens leave them empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Issuer (control-plane base URL).
    pub iss: String,

    /// Subject (user id, client id, or player identity).
    pub sub: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Audience, present only when audience checking is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Role names of the authenticated user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// User id when the token represents a user session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Username when the token represents a user session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Client the token was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// User principal name for federation-style consumers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upn: Option<String>,

    /// Match the token grants access to (match tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,

    /// Container hosting the match, when container-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,

    /// Player slot inside the match (match tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<u64>,

    /// Display name of the player (match tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,

    /// Id of the stored match-token record (match tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_token_id: Option<String>,
}

impl AccessTokenClaims {
    /// Starts a claims draft for the given subject. `iss`, `iat`, `exp`,
    /// and `aud` are stamped by [`JwtService::issue`].
    #[must_use]
    pub fn for_subject(subject: impl Into<String>) -> Self {
        Self {
            iss: String::new(),
            sub: subject.into(),
            iat: 0,
            exp: 0,
            aud: None,
            scopes: Vec::new(),
            roles: None,
            user_id: None,
            username: None,
            client_id: None,
            upn: None,
            match_id: None,
            container_id: None,
            player_id: None,
            player_name: None,
            match_token_id: None,
        }
    }

    /// Sets the granted scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the role names.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Sets the user identity claims.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>, username: impl Into<String>) -> Self {
        let username = username.into();
        self.user_id = Some(user_id.into());
        self.upn = Some(username.clone());
        self.username = Some(username);
        self
    }

    /// Sets the client id claim.
    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Returns `true` if these claims describe a match token.
    #[must_use]
    pub fn is_match_token(&self) -> bool {
        self.match_id.is_some() && self.match_token_id.is_some()
    }
}

/// Signs and verifies Stormgrid JWTs.
pub struct JwtService {
    issuer: String,
    audience: Option<String>,
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// Creates an RS256 service from PEM-encoded keys.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if either PEM fails to parse.
    pub fn rs256_from_pem(
        private_pem: &[u8],
        public_pem: &[u8],
        issuer: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AuthError::configuration(format!("invalid RSA private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| AuthError::configuration(format!("invalid RSA public key: {e}")))?;
        Ok(Self {
            issuer: issuer.into(),
            audience: None,
            algorithm: Algorithm::RS256,
            encoding,
            decoding,
            clock,
        })
    }

    /// Creates an HS256 service from a shared secret.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the secret is shorter than 32 bytes.
    pub fn hs256(
        secret: &[u8],
        issuer: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        if secret.len() < 32 {
            return Err(AuthError::configuration(
                "HS256 secret must be at least 32 bytes",
            ));
        }
        Ok(Self {
            issuer: issuer.into(),
            audience: None,
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            clock,
        })
    }

    /// Opts into audience validation: issued tokens carry `aud` and
    /// verification rejects tokens without it.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// The configured issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The signing algorithm name ("RS256" or "HS256").
    #[must_use]
    pub fn algorithm_name(&self) -> &'static str {
        match self.algorithm {
            Algorithm::RS256 => "RS256",
            _ => "HS256",
        }
    }

    /// Signs the claims draft, stamping `iss`, `iat`, `exp`, and `aud`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if encoding fails (malformed key material).
    pub fn issue(&self, mut claims: AccessTokenClaims, ttl: Duration) -> AuthResult<String> {
        let now = self.clock.unix_timestamp();
        claims.iss = self.issuer.clone();
        claims.iat = now;
        claims.exp = now + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        claims.aud = self.audience.clone();

        encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| AuthError::internal(format!("token encoding failed: {e}")))
    }

    /// Verifies signature, issuer, audience (when configured), and expiry
    /// against the injected clock, returning the decoded claims.
    ///
    /// # Errors
    ///
    /// - `TokenSignatureInvalid`: bad signature, wrong issuer/audience, or
    ///   a token this service never could have issued
    /// - `TokenExpired`: `exp` is not in the future
    pub fn verify(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        // Expiry is enforced below against the injected clock; the claim
        // itself is still required to be present.
        validation.validate_exp = false;
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data = decode::<AccessTokenClaims>(token, &self.decoding, &validation)
            .map_err(map_decode_error)?;

        if data.claims.exp <= self.clock.unix_timestamp() {
            return Err(AuthError::TokenExpired);
        }

        Ok(data.claims)
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidAlgorithm => AuthError::TokenSignatureInvalid,
        _ => AuthError::unauthorized(format!("token rejected: {err}")),
    }
}

/// Generates a fresh 2048-bit RSA key pair as (private, public) PKCS#8 PEM.
///
/// Used by deployments that want RS256 without pre-provisioned keys, and by
/// tests.
///
/// # Errors
///
/// Returns `Internal` if key generation fails.
pub fn generate_rsa_keys_pem() -> AuthResult<(String, String)> {
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    let private = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048)
        .map_err(|e| AuthError::internal(format!("RSA key generation failed: {e}")))?;
    let public = rsa::RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AuthError::internal(format!("private key encoding failed: {e}")))?
        .to_string();
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AuthError::internal(format!("public key encoding failed: {e}")))?;

    Ok((private_pem, public_pem))
}
