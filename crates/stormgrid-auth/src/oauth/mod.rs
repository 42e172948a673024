//! OAuth 2.0 token endpoint types and grant handling.

pub mod request;
pub mod service;

pub use request::{OAuthErrorBody, TokenRequest, TokenResponse};
pub use service::TokenService;
