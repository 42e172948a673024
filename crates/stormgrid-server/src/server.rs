//! Router assembly and process lifecycle.

use std::any::Any;

use anyhow::Context;
use axum::body::Bytes;
use axum::http::{StatusCode, header};
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use stormgrid_auth::middleware::authorize;
use stormgrid_config::ServerConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{autoscaler, nodes, oauth, system};
use crate::state::AppState;
use crate::ws;

/// Builds the router and its state from configuration.
///
/// # Errors
///
/// Fails when the state graph cannot be built (bad signing material,
/// unseedable clients).
pub async fn build_app(config: ServerConfig) -> anyhow::Result<(Router, AppState)> {
    let state = AppState::from_config(config).await?;
    Ok((router(state.clone()), state))
}

/// Assembles the control-plane router over prepared state.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(system::root))
        .route("/healthz", get(system::healthz))
        .route("/readyz", get(system::readyz))
        .route("/oauth2/token", post(oauth::token))
        .route("/api/tokens/validate", post(oauth::validate))
        .route("/api/nodes", post(nodes::register).get(nodes::list))
        .route("/api/nodes/{id}/heartbeat", put(nodes::heartbeat))
        .route("/api/nodes/{id}/drain", post(nodes::drain))
        .route("/api/nodes/{id}", delete(nodes::deregister))
        .route("/api/autoscaler/recommendation", get(autoscaler::recommendation))
        .route("/api/autoscaler/ack", post(autoscaler::ack))
        .route("/ws", get(ws::upgrade))
        .layer(middleware::from_fn_with_state(
            state.auth_layer.clone(),
            authorize,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Maps an escaped panic onto a 503 without leaking the payload.
fn handle_panic(
    err: Box<dyn Any + Send + 'static>,
) -> axum::http::Response<http_body_util::Full<Bytes>> {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Handler panicked");

    let body = Bytes::from_static(br#"{"error":"server_error"}"#);
    axum::http::Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .header(header::CONTENT_TYPE, "application/json")
        .body(http_body_util::Full::new(body))
        .expect("static response must build")
}

/// The long-lived sweep tasks owned by the process.
///
/// Each sweep watches the shared shutdown flag and exits promptly when it
/// flips; [`BackgroundTasks::stop`] joins them all.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Spawns the registry TTL sweep, rate-limit cleanup, broker expiry
    /// sweep, and match-token cleanup.
    #[must_use]
    pub fn spawn(state: &AppState) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let mut handles = vec![
            state.registry.spawn_sweeper(rx.clone()),
            state.rate_limiter.spawn_sweeper(rx.clone()),
            state.broker.spawn_sweeper(rx.clone()),
        ];

        let match_tokens = state.match_tokens.clone();
        let interval = state.config.registry.sweep_interval;
        let mut rx_tokens = rx;
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {
                        if let Err(err) = match_tokens.cleanup_expired().await {
                            tracing::warn!(error = %err, "Match token cleanup failed");
                        }
                    }
                    _ = rx_tokens.changed() => break,
                }
            }
        }));

        Self { shutdown, handles }
    }

    /// Signals every sweep to stop and waits for them to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        tracing::info!("Background sweeps stopped");
    }
}

/// Runs the control plane until a shutdown signal arrives.
///
/// # Errors
///
/// Fails on bind errors or fatal serve errors.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let bind_address = config.server.bind_address.clone();
    let (app, state) = build_app(config).await?;
    let tasks = BackgroundTasks::spawn(&state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(addr = %bind_address, "Stormgrid control plane listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tasks.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
