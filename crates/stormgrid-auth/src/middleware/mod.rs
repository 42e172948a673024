//! Request authorization middleware.

pub mod auth;
pub mod exchange;

pub use auth::{AuthLayerState, AuthenticatedCaller, authorize};
pub use exchange::ApiTokenExchanger;
