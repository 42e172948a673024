//! Error-event fan-out for the control plane.
//!
//! Match containers, the scheduler, and the auth layer all report
//! operational errors through one broadcaster; facades subscribe with a
//! match/player filter and forward matching events to their clients.

pub mod broadcaster;
pub mod types;

pub use broadcaster::{ErrorBroadcaster, ErrorSubscription};
pub use types::{ErrorFilter, ErrorKind, GameError};
