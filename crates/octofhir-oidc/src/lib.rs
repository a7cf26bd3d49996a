//! # octofhir-oidc
//!
//! Token lifecycle core of the OctoFHIR OpenID Connect provider.
//!
//! This crate provides:
//! - Opaque HMAC tokens and RFC 9068 JWT access tokens
//! - Authorization code, client credentials and refresh token grants
//! - PKCE (RFC 7636)
//! - Refresh token rotation with reuse detection
//! - JWT secured authorization responses (JARM)
//! - Token introspection (RFC 7662) and revocation (RFC 7009)
//!
//! ## Overview
//!
//! Grant handlers validate requests and persist the resulting sessions keyed
//! by token signature. Client authentication, consent and the HTTP surface
//! are left to the embedding server; [`Provider`] is the entry point it
//! calls once those are done.
//!
//! ## Modules
//!
//! - [`amr`] - Authentication method references
//! - [`claims`] - OpenID Connect `claims` request parameter
//! - [`config`] - Lifespans, token format and matching strategies
//! - [`error`] - Error kinds and the crate error type
//! - [`oauth`] - Grant handlers, PKCE, JARM and the handler registry
//! - [`provider`] - Facade routing endpoint requests through the handlers
//! - [`request`] - Requests and responses flowing through the handlers
//! - [`session`] - Session claims carried by every token
//! - [`storage`] - Storage traits and the in-memory store
//! - [`token`] - Token strategies, introspection and revocation
//! - [`types`] - Clients and consent records

pub mod amr;
pub mod claims;
pub mod config;
pub mod error;
pub mod oauth;
pub mod provider;
pub mod request;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AudienceStrategy, ConfigError, OidcConfig, ScopeStrategy};
pub use error::{AuthError, ErrorCategory, ErrorKind};
pub use oauth::{HandlerContext, HandlerRegistry};
pub use provider::{Provider, ProviderBuilder};
pub use request::{
    AccessRequest, AccessResponse, AuthorizeRequest, AuthorizeResponse, Request, ResponseMode,
    TokenKind,
};
pub use session::Session;
pub use storage::{MemoryStore, StorageError, TokenStore};
pub use token::{JwtProfileStrategy, JwtSigner, OpaqueStrategy, TokenStrategy};
pub use types::{Client, GrantType};

/// Type alias for token lifecycle results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```
/// use octofhir_oidc::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::amr::AuthenticationMethods;
    pub use crate::claims::{ClaimRequest, ClaimsRequests};
    pub use crate::config::{AudienceStrategy, ConfigError, OidcConfig, ScopeStrategy};
    pub use crate::error::{AuthError, ErrorCategory, ErrorKind};
    pub use crate::oauth::{
        AuthorizeEndpointHandler, HandlerContext, HandlerRegistry, JarmEncoder, PkceChallenge,
        PkceChallengeMethod, PkceVerifier, RevocationHandler, TokenEndpointHandler,
        TokenIntrospector,
    };
    pub use crate::provider::{Provider, ProviderBuilder};
    pub use crate::request::{
        AccessRequest, AccessResponse, AuthorizeRequest, AuthorizeResponse, Request,
        ResponseMode, TokenKind,
    };
    pub use crate::session::{JwtClaims, Session};
    pub use crate::storage::{MemoryStore, StorageError, TokenStore};
    pub use crate::token::{
        JwtProfileStrategy, JwtSigner, OpaqueStrategy, SigningAlgorithm, SigningKeyPair,
        TokenStrategy,
    };
    pub use crate::types::{Client, ConsentRecord, GrantType};
}
