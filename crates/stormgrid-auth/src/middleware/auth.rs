//! Bearer authorization middleware.
//!
//! One middleware enforces the policy table on every request:
//!
//! ```text
//! request → bearer present? ── no ─→ X-Api-Token? ── yes ─→ exchange (cached)
//!               │ yes                    │ no
//!               ▼                        ▼
//!          verify JWT             anonymous caller
//!               │                        │
//!               ▼                        ▼
//!        policy(method, path): Anonymous → route
//!                              Require → scopes satisfied? route : 403
//!                              (no credentials at all → 401)
//! ```
//!
//! Verified claims are inserted into request extensions as
//! [`AuthenticatedCaller`] for handlers that need the identity.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AuthError;
use crate::oauth::request::OAuthErrorBody;
use crate::policy::{AccessRule, PolicyTable};
use crate::token::jwt::{AccessTokenClaims, JwtService};

use super::exchange::ApiTokenExchanger;

/// Header carrying an exchangeable API token.
const API_TOKEN_HEADER: &str = "x-api-token";

/// State the authorization middleware runs with.
#[derive(Clone)]
pub struct AuthLayerState {
    /// JWT verification.
    pub jwt: Arc<JwtService>,
    /// Endpoint policy table.
    pub policy: Arc<PolicyTable>,
    /// API-token exchange hook; `None` disables the hook.
    pub exchanger: Option<Arc<ApiTokenExchanger>>,
}

/// The verified identity of the caller, available to handlers via request
/// extensions after the middleware ran.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    /// Verified token claims.
    pub claims: Arc<AccessTokenClaims>,
}

impl AuthenticatedCaller {
    /// Scopes the caller carries.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.claims.scopes
    }

    /// The authenticated subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(OAuthErrorBody::from(&self));
        let mut response = (status, body).into_response();

        match &self {
            AuthError::RateLimited {
                retry_after_seconds,
            } => {
                if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
            _ if status == StatusCode::UNAUTHORIZED => {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer"),
                );
            }
            _ => {}
        }
        response
    }
}

/// Authorization middleware; wire with
/// `axum::middleware::from_fn_with_state`.
pub async fn authorize(
    State(state): State<AuthLayerState>,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let token = match bearer_token(&request) {
        Some(token) => Some(token),
        None => match exchangeable_api_token(&request, &state) {
            Some((api_token, exchanger)) => {
                let client_ip = peer_ip(&request);
                match exchanger.exchange(&api_token, &client_ip).await {
                    Ok(session) => Some(session),
                    Err(err) => {
                        tracing::debug!(error = %err.kind(), "API token exchange failed");
                        return err.into_response();
                    }
                }
            }
            None => None,
        },
    };

    let caller = match token {
        None => None,
        Some(token) => match state.jwt.verify(&token) {
            Ok(claims) => Some(AuthenticatedCaller {
                claims: Arc::new(claims),
            }),
            Err(err) => {
                tracing::debug!(error = %err.kind(), path = %path, "Bearer token rejected");
                return err.into_response();
            }
        },
    };

    match state.policy.lookup(&method, &path) {
        AccessRule::Anonymous => {
            if let Some(caller) = caller {
                request.extensions_mut().insert(caller);
            }
            next.run(request).await
        }
        AccessRule::Require(policy) => {
            let Some(caller) = caller else {
                return AuthError::unauthorized("missing bearer token").into_response();
            };
            if !policy.is_satisfied_by(caller.scopes()) {
                let missing = policy.missing_for(caller.scopes());
                tracing::debug!(
                    subject = %caller.subject(),
                    path = %path,
                    missing = %missing.join(" "),
                    "Caller lacks required scopes"
                );
                return AuthError::forbidden(missing).into_response();
            }
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
    }
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}

fn exchangeable_api_token(
    request: &Request,
    state: &AuthLayerState,
) -> Option<(String, Arc<ApiTokenExchanger>)> {
    let exchanger = state.exchanger.clone()?;
    let token = request
        .headers()
        .get(API_TOKEN_HEADER)?
        .to_str()
        .ok()
        .filter(|t| !t.is_empty())?
        .to_string();
    Some((token, exchanger))
}

fn peer_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ScopePolicy;
    use axum::Router;
    use axum::body::Body;
    use axum::http::Method;
    use axum::routing::get;
    use std::time::Duration;
    use stormgrid_core::ManualClock;
    use tower::ServiceExt;

    fn state(policy: PolicyTable) -> (Arc<JwtService>, AuthLayerState) {
        let clock = Arc::new(ManualClock::epoch());
        let jwt = Arc::new(
            JwtService::hs256(
                b"0123456789abcdef0123456789abcdef",
                "https://control.test",
                clock,
            )
            .unwrap(),
        );
        let state = AuthLayerState {
            jwt: jwt.clone(),
            policy: Arc::new(policy),
            exchanger: None,
        };
        (jwt, state)
    }

    fn app(state: AuthLayerState) -> Router {
        Router::new()
            .route("/api/nodes", get(|| async { "nodes" }))
            .route("/healthz", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(state, authorize))
    }

    fn token(jwt: &JwtService, scopes: &[&str]) -> String {
        jwt.issue(
            AccessTokenClaims::for_subject("caller")
                .with_scopes(scopes.iter().map(ToString::to_string).collect()),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    fn protected_table() -> PolicyTable {
        PolicyTable::new(AccessRule::Anonymous).protect(
            Method::GET,
            "/api/nodes",
            ScopePolicy::require("control-plane.cluster.read"),
        )
    }

    async fn send(app: Router, request: axum::http::Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[tokio::test]
    async fn test_anonymous_route_passes_without_token() {
        let (_, state) = state(protected_table());
        let request = axum::http::Request::get("/healthz").body(Body::empty()).unwrap();
        let (status, _) = send(app(state), request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let (_, state) = state(protected_table());
        let request = axum::http::Request::get("/api/nodes").body(Body::empty()).unwrap();
        let (status, body) = send(app(state), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("unauthorized"));
    }

    #[tokio::test]
    async fn test_protected_route_with_sufficient_scope() {
        let (jwt, state) = state(protected_table());
        let bearer = token(&jwt, &["control-plane.*"]);
        let request = axum::http::Request::get("/api/nodes")
            .header("authorization", format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app(state), request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_missing_scope_is_forbidden() {
        let (jwt, state) = state(protected_table());
        let bearer = token(&jwt, &["engine.match.read"]);
        let request = axum::http::Request::get("/api/nodes")
            .header("authorization", format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(state), request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("control-plane.cluster.read"));
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized_even_on_anonymous_route() {
        let (_, state) = state(protected_table());
        let request = axum::http::Request::get("/healthz")
            .header("authorization", "Bearer garbage")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app(state), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_rate_limited_response_carries_retry_after() {
        let err = AuthError::RateLimited {
            retry_after_seconds: 17,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from_static("17")
        );
    }
}
