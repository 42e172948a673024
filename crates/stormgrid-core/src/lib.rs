//! Core primitives shared across the Stormgrid control plane.
//!
//! This crate holds the small, dependency-light building blocks that every
//! other control-plane crate uses: the injectable [`Clock`], id generation,
//! and the error-event broadcaster.

pub mod clock;
pub mod events;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{ErrorBroadcaster, ErrorKind, ErrorSubscription, GameError};
pub use id::generate_id;
