//! Token signing and verification.

pub mod jwt;

pub use jwt::{AccessTokenClaims, JwtService, generate_rsa_keys_pem};
