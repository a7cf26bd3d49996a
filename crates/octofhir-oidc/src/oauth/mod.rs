//! OAuth 2.0 grant handlers.
//!
//! - [`authorize_code`] - Authorization code grant
//! - [`client_credentials`] - Client credentials grant
//! - [`refresh`] - Refresh token grant with rotation and reuse detection
//! - [`pkce`] - PKCE challenge binding and verification
//! - [`jarm`] - JWT secured authorization responses
//! - [`handler`] - Handler traits and the registry composing them

pub mod authorize_code;
pub mod client_credentials;
pub mod handler;
pub mod jarm;
pub mod pkce;
pub mod refresh;

#[cfg(test)]
pub(crate) mod testing;

pub use authorize_code::AuthorizeCodeHandler;
pub use client_credentials::ClientCredentialsGrantHandler;
pub use handler::{
    AuthorizeEndpointHandler, HandlerContext, HandlerRegistry, RevocationHandler,
    TokenEndpointHandler, TokenIntrospector,
};
pub use jarm::JarmEncoder;
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceHandler, PkceVerifier};
pub use refresh::RefreshTokenGrantHandler;
