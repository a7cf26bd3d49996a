//! Token issuance, validation, introspection and revocation.
//!
//! This module provides:
//!
//! - HMAC-signed opaque tokens
//! - RFC 9068 JWT access tokens
//! - Token introspection (RFC 7662)
//! - Token revocation (RFC 7009)

pub mod introspection;
pub mod jwt;
pub mod opaque;
pub mod revocation;
pub mod strategy;

pub use introspection::{CoreIntrospector, StatelessJwtIntrospector};
pub use jwt::{JwtError, JwtHeaderOptions, JwtSigner, SigningAlgorithm, SigningKeyPair};
pub use opaque::OpaqueStrategy;
pub use revocation::TokenRevocationHandler;
pub use strategy::{
    JWT_ACCESS_TOKEN_TYPE, JwtProfileStrategy, TokenStrategy, is_jwt_profile_access_token,
};
