//! Domain types owned by the auth core.

pub mod client;
pub mod match_token;
pub mod refresh_token;
pub mod role;
pub mod user;

pub use client::{ClientKind, GrantType, ServiceClient};
pub use match_token::MatchToken;
pub use refresh_token::RefreshToken;
pub use role::Role;
pub use user::User;
