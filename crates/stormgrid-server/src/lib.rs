//! HTTP and WebSocket facade of the Stormgrid control plane.
//!
//! Everything behind these routes lives in `stormgrid-auth` and
//! `stormgrid-cluster`; this crate only wires state, maps errors onto the
//! RFC 6749 wire shape, and owns the process lifecycle (background sweeps,
//! graceful shutdown).

pub mod handlers;
pub mod server;
pub mod state;
pub mod ws;

pub use server::{BackgroundTasks, build_app, run};
pub use state::AppState;

/// Installs the global tracing subscriber (env-filter + fmt).
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stormgrid=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
