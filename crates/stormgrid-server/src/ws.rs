//! WebSocket upgrade and error-event streaming.
//!
//! Tokens arrive with the upgrade via `Authorization: Bearer`, the
//! `Sec-WebSocket-Protocol: Bearer.<token>` subprotocol, or a query
//! parameter. The upgrade handler verifies the token and parks the result
//! in the auth broker; the connection handler claims it once the socket
//! (and with it the connection id) exists, then streams matching error
//! events to the client.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use stormgrid_auth::broker::{AuthBroker, AuthHandoff, AuthKind};
use stormgrid_auth::token::jwt::AccessTokenClaims;
use stormgrid_core::{ErrorSubscription, generate_id};
use time::OffsetDateTime;

use crate::state::AppState;

/// WebSocket close code for a failed claim (policy violation).
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// GET `/ws`.
pub async fn upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let query = query.unwrap_or_default();

    // Authenticate during the handshake and park the result in the broker.
    let mut effective_query = query.clone();
    if let Some(token) = upgrade_token(&headers, &query) {
        match state.auth_layer.jwt.verify(&token) {
            Ok(claims) => {
                state
                    .broker
                    .store(AuthBroker::token_key(&token), handoff_from_claims(&claims));
                if !query.contains("token=") {
                    // Header/subprotocol tokens re-enter through the query
                    // path so the claim logic has one shape.
                    effective_query = if query.is_empty() {
                        format!("token={token}")
                    } else {
                        format!("{query}&token={token}")
                    };
                }
            }
            Err(err) => return err.into_response(),
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, effective_query))
}

fn upgrade_token(headers: &HeaderMap, query: &str) -> Option<String> {
    if let Some(bearer) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(bearer.to_string());
    }

    // Preferred transport: Sec-WebSocket-Protocol: Bearer.<token>
    if let Some(token) = headers
        .get("sec-websocket-protocol")
        .and_then(|v| v.to_str().ok())
        .and_then(|protocols| {
            protocols
                .split(',')
                .map(str::trim)
                .find_map(|p| p.strip_prefix("Bearer."))
        })
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    // Query fallback: verified here, claimed after the upgrade.
    for param in ["match_token", "token", "api_token"] {
        if let Some(value) = query_param(query, param) {
            return Some(value.to_string());
        }
    }
    None
}

fn handoff_from_claims(claims: &AccessTokenClaims) -> AuthHandoff {
    let auth_type = if claims.is_match_token() {
        AuthKind::MatchToken
    } else if claims.user_id.is_some() {
        AuthKind::User
    } else {
        AuthKind::Client
    };
    AuthHandoff {
        principal: claims.sub.clone(),
        auth_type,
        scopes: claims.scopes.clone(),
        expires_at: OffsetDateTime::from_unix_timestamp(claims.exp)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH),
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState, query: String) {
    let connection_id = generate_id();

    let Some(handoff) = state
        .broker
        .claim_from_query(&query, &connection_id, "/ws")
    else {
        tracing::debug!("WebSocket connection without claimable auth");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY_VIOLATION,
                reason: "authentication required".into(),
            })))
            .await;
        return;
    };

    tracing::debug!(
        connection_id = %connection_id,
        principal = %handoff.principal,
        "WebSocket connection authenticated"
    );

    let mut subscription = subscribe_for(&state, &query);
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Pings are answered by the protocol layer; other
                    // client frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.broker.remove(&connection_id);
}

fn subscribe_for(state: &AppState, query: &str) -> ErrorSubscription {
    match query_param(query, "match_id") {
        Some(match_id) => match query_param(query, "player_id").and_then(|p| p.parse().ok()) {
            Some(player_id) => state.errors.subscribe_to_player(match_id, player_id),
            None => state.errors.subscribe_to_match(match_id),
        },
        None => state.errors.subscribe(),
    }
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}
