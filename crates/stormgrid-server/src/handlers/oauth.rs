//! Token endpoint and token validation.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Form, Json};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use serde::{Deserialize, Serialize};
use stormgrid_auth::oauth::TokenRequest;

use crate::state::AppState;

/// POST `/oauth2/token`.
///
/// Accepts client authentication via HTTP Basic or form fields; Basic
/// credentials win when both are present, per RFC 6749 §2.3.1.
pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(mut request): Form<TokenRequest>,
) -> Response {
    if let Some((client_id, client_secret)) = basic_credentials(&headers) {
        request.client_id = Some(client_id);
        request.client_secret = client_secret;
    }

    let ip = client_ip(&headers);
    match state.token_service.grant(request, &ip).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Request body of POST `/api/tokens/validate`.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    /// The compact JWT to check.
    pub token: String,
}

/// Response body of POST `/api/tokens/validate`.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    /// Whether the token verified.
    pub valid: bool,

    /// User id claim, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Username claim, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Granted scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,

    /// Expiry as a Unix timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Match id, for match tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,

    /// Player id, for match tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<u64>,

    /// Why validation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST `/api/tokens/validate`.
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Json<ValidateResponse> {
    match state.token_service.validate(&request.token) {
        Ok(claims) => Json(ValidateResponse {
            valid: true,
            user_id: claims.user_id.clone(),
            username: claims.username.clone(),
            scopes: Some(claims.scopes.clone()),
            expires_at: Some(claims.exp),
            match_id: claims.match_id.clone(),
            player_id: claims.player_id,
            error: None,
        }),
        Err(err) => Json(ValidateResponse {
            valid: false,
            user_id: None,
            username: None,
            scopes: None,
            expires_at: None,
            match_id: None,
            player_id: None,
            error: Some(err.oauth_error_code().to_string()),
        }),
    }
}

/// Parses `Authorization: Basic` into `(client_id, secret)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, Option<String>)> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    if id.is_empty() {
        return None;
    }
    let secret = (!secret.is_empty()).then(|| secret.to_string());
    Some((id.to_string(), secret))
}

/// Best-effort source address for rate-limit keying.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| "unknown".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_basic_credentials_parsing() {
        let mut headers = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode("ops:s3cret");
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );

        let (id, secret) = basic_credentials(&headers).unwrap();
        assert_eq!(id, "ops");
        assert_eq!(secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_basic_credentials_rejects_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token"),
        );
        assert!(basic_credentials(&headers).is_none());
    }

    #[test]
    fn test_client_ip_from_forwarded_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.1.2.3, 172.16.0.1"),
        );
        assert_eq!(client_ip(&headers), "10.1.2.3");
    }
}
