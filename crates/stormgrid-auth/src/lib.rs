//! Authentication and authorization core for the Stormgrid control plane.
//!
//! This crate is the trust boundary of the platform. It issues and validates
//! every credential that crosses a service boundary:
//!
//! - OAuth 2.0 token issuance (client credentials, password, refresh-token
//!   rotation, token exchange) in [`oauth`]
//! - Per-player match capability tokens in [`match_token`]
//! - JWT signing and verification in [`token`]
//! - Users, roles (with inheritance), and service clients in [`directory`]
//! - Wildcard scope containment in [`scope`]
//! - Request authorization policy and the bearer middleware in [`policy`]
//!   and [`middleware`]
//! - Sliding-window request throttling in [`rate_limit`]
//! - The WebSocket upgrade handoff store in [`broker`]
//!
//! Storage is behind async traits in [`storage`]; the in-memory backends
//! there are the default deployment and the test substrate.

pub mod broker;
pub mod config;
pub mod directory;
pub mod error;
pub mod match_token;
pub mod middleware;
pub mod oauth;
pub mod password;
pub mod policy;
pub mod rate_limit;
pub mod scope;
pub mod storage;
pub mod token;
pub mod types;

pub use error::{AuthError, AuthResult};
